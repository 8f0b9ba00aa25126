use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::engine::lifecycle::Event;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub packages_created_total: IntCounter,
    pub lifecycle_transitions_total: IntCounterVec,
    pub penalty_updates_total: IntCounter,
    pub payments_total: IntCounterVec,
    pub notification_failures_total: IntCounterVec,
    pub transition_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let packages_created_total =
            IntCounter::new("packages_created_total", "Packages received at the front desk")
                .expect("valid packages_created_total metric");

        let lifecycle_transitions_total = IntCounterVec::new(
            Opts::new(
                "lifecycle_transitions_total",
                "Package lifecycle events by outcome",
            ),
            &["event", "outcome"],
        )
        .expect("valid lifecycle_transitions_total metric");

        let penalty_updates_total = IntCounter::new(
            "penalty_updates_total",
            "Stored penalty fees rewritten after recomputation",
        )
        .expect("valid penalty_updates_total metric");

        let payments_total = IntCounterVec::new(
            Opts::new("payments_total", "Payments by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("valid payments_total metric");

        let notification_failures_total = IntCounterVec::new(
            Opts::new(
                "notification_failures_total",
                "Notifications that failed to deliver",
            ),
            &["channel"],
        )
        .expect("valid notification_failures_total metric");

        let transition_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "transition_latency_seconds",
                "Latency of lifecycle transitions in seconds",
            ),
            &["event"],
        )
        .expect("valid transition_latency_seconds metric");

        registry
            .register(Box::new(packages_created_total.clone()))
            .expect("register packages_created_total");
        registry
            .register(Box::new(lifecycle_transitions_total.clone()))
            .expect("register lifecycle_transitions_total");
        registry
            .register(Box::new(penalty_updates_total.clone()))
            .expect("register penalty_updates_total");
        registry
            .register(Box::new(payments_total.clone()))
            .expect("register payments_total");
        registry
            .register(Box::new(notification_failures_total.clone()))
            .expect("register notification_failures_total");
        registry
            .register(Box::new(transition_latency_seconds.clone()))
            .expect("register transition_latency_seconds");

        Self {
            registry,
            packages_created_total,
            lifecycle_transitions_total,
            penalty_updates_total,
            payments_total,
            notification_failures_total,
            transition_latency_seconds,
        }
    }

    pub fn record_transition<T, E>(&self, event: Event, result: &Result<T, E>, elapsed: f64) {
        let outcome = if result.is_ok() { "success" } else { "rejected" };
        self.lifecycle_transitions_total
            .with_label_values(&[event.as_label(), outcome])
            .inc();
        self.transition_latency_seconds
            .with_label_values(&[event.as_label()])
            .observe(elapsed);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
