use std::sync::Arc;
use std::time::Duration;

use parcel_desk::api;
use parcel_desk::config::Config;
use parcel_desk::engine::penalty::run_penalty_sweep;
use parcel_desk::error::AppError;
use parcel_desk::notify::{Dispatcher, LogNotifier, Notifier};
use parcel_desk::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let channels: Vec<Arc<dyn Notifier>> = vec![
        Arc::new(LogNotifier::new("push")),
        Arc::new(LogNotifier::new("whatsapp")),
    ];
    let shared_state =
        Arc::new(AppState::new(&config).with_notifications(Dispatcher::new(channels)));

    let app = api::rest::router(shared_state.clone());

    if config.penalty_sweep_interval_secs > 0 {
        tokio::spawn(run_penalty_sweep(
            shared_state.clone(),
            Duration::from_secs(config.penalty_sweep_interval_secs),
        ));
    }

    if config.payment_server_key.is_empty() {
        tracing::warn!("PAYMENT_SERVER_KEY is not set; gateway callbacks will be rejected");
    }

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        utc_offset = %config.local_offset,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
