use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Serialize;

use crate::engine::payments::{self, CallbackOutcome};
use crate::error::AppError;
use crate::gateway::GatewayCallback;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/payment", post(payment_callback))
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub outcome: CallbackOutcome,
}

/// Gateway server-to-server notification. Unauthenticated; the payload
/// signature is the only credential.
async fn payment_callback(
    State(state): State<Arc<AppState>>,
    Json(callback): Json<GatewayCallback>,
) -> Result<Json<CallbackResponse>, AppError> {
    let outcome = payments::handle_callback(&state, &callback, Utc::now())?;
    Ok(Json(CallbackResponse { outcome }))
}
