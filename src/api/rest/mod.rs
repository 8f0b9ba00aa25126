pub mod actor;
pub mod locations;
pub mod packages;
pub mod users;
pub mod webhooks;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::models::package::PackageStatus;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(locations::router())
        .merge(packages::router())
        .merge(users::router())
        .merge(webhooks::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    locations: usize,
    users: usize,
    packages: usize,
    awaiting_pickup: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let awaiting_pickup = state
        .packages
        .iter()
        .filter(|entry| {
            matches!(
                entry.value().status,
                PackageStatus::PendingPickup | PackageStatus::Paid
            )
        })
        .count();

    Json(HealthResponse {
        status: "ok",
        locations: state.locations.len(),
        users: state.users.len(),
        packages: state.packages.len(),
        awaiting_pickup,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
