//! Resident notifications and the live package event feed.
//!
//! Delivery is best-effort: a failing channel is logged and counted, and never
//! undoes the package or payment write that triggered it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::transaction::TransactionKind;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    PackageArrived {
        user_id: Uuid,
        receipt_number: String,
        location_name: String,
    },
    PaymentSucceeded {
        user_id: Uuid,
        amount: Decimal,
        kind: TransactionKind,
    },
}

#[derive(Debug, Error)]
#[error("{channel} delivery failed: {reason}")]
pub struct NotifyError {
    pub channel: &'static str,
    pub reason: String,
}

pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn dispatch(&self, notification: &Notification, metrics: &Metrics) {
        for notifier in &self.notifiers {
            if let Err(err) = notifier.notify(notification) {
                metrics
                    .notification_failures_total
                    .with_label_values(&[notifier.channel()])
                    .inc();
                warn!(channel = notifier.channel(), error = %err, "notification dropped");
            }
        }
    }
}

/// Writes notifications to the log. Stands in for a transport until one is
/// wired up for the channel.
pub struct LogNotifier {
    channel: &'static str,
}

impl LogNotifier {
    pub fn new(channel: &'static str) -> Self {
        Self { channel }
    }
}

impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        self.channel
    }

    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(notification).map_err(|err| NotifyError {
            channel: self.channel,
            reason: err.to_string(),
        })?;
        info!(channel = self.channel, %payload, "notification sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PackageEventKind {
    Created,
    Paid,
    HandedOver,
    Returned,
    Destroyed,
}

/// Broadcast to kiosk screens over the websocket feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEvent {
    pub kind: PackageEventKind,
    pub package_id: Uuid,
    pub receipt_number: String,
    pub location_id: Uuid,
    pub user_id: Uuid,
    pub at: DateTime<Utc>,
}
