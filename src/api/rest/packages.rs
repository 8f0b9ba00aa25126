use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::actor::CurrentActor;
use crate::engine::intake::{self, NewPackage};
use crate::engine::lifecycle::{self, Event, Transitioned};
use crate::engine::payments::{self, HandoverCheck, PaymentReceipt};
use crate::engine::penalty;
use crate::error::AppError;
use crate::models::package::Package;
use crate::models::transaction::Transaction;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/packages", post(create_package))
        .route("/packages/:id", get(get_package).delete(destroy_package))
        .route("/packages/:id/payable", get(payable))
        .route("/packages/:id/delivery", post(request_delivery))
        .route("/packages/:id/pay", post(pay_package))
        .route("/packages/:id/checkout", post(checkout_package))
        .route("/packages/:id/mark-paid", post(mark_paid))
        .route("/packages/:id/handover", post(handover))
        .route("/packages/:id/return", post(return_package))
        .route("/receipts/:receipt_number", get(get_package_by_receipt))
}

/// Optional optimistic-concurrency guard for transitions.
#[derive(Debug, Default, Deserialize)]
pub struct TransitionRequest {
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Serialize)]
pub struct DestroyResponse {
    pub destroyed: bool,
    pub receipt_number: String,
}

async fn create_package(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<NewPackage>,
) -> Result<Json<Package>, AppError> {
    let package = intake::create_package(&state, &actor, payload, Utc::now())?;
    Ok(Json(package))
}

async fn get_package(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Package>, AppError> {
    let package = penalty::refresh_penalty(&state, id, Utc::now())?;
    actor.require_owner_or_staff(package.user_id)?;
    Ok(Json(package))
}

async fn get_package_by_receipt(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(receipt_number): Path<String>,
) -> Result<Json<Package>, AppError> {
    actor.require_staff()?;
    let id = state.package_by_receipt(&receipt_number)?.id;
    Ok(Json(penalty::refresh_penalty(&state, id, Utc::now())?))
}

async fn payable(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<HandoverCheck>, AppError> {
    let check = payments::handover_check(&state, id, Utc::now())?;
    actor.require_owner_or_staff(check.package.user_id)?;
    Ok(Json(check))
}

async fn request_delivery(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Package>, AppError> {
    Ok(Json(intake::request_delivery(&state, &actor, id, Utc::now())?))
}

async fn pay_package(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentReceipt>, AppError> {
    Ok(Json(payments::pay_package(&state, &actor, id, Utc::now())?))
}

async fn checkout_package(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(payments::checkout_package(&state, &actor, id, Utc::now())?))
}

async fn mark_paid(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<Transitioned>, AppError> {
    actor.require_admin()?;
    transition(&state, id, Event::MarkPaid, body)
}

async fn handover(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<Transitioned>, AppError> {
    actor.require_staff()?;
    transition(&state, id, Event::Handover, body)
}

async fn return_package(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<Transitioned>, AppError> {
    actor.require_admin()?;
    transition(&state, id, Event::Return, body)
}

async fn destroy_package(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<DestroyResponse>, AppError> {
    actor.require_staff()?;
    let Json(done) = transition(&state, id, Event::Destroy, body)?;
    Ok(Json(DestroyResponse {
        destroyed: done.changed,
        receipt_number: done.package.receipt_number,
    }))
}

fn transition(
    state: &AppState,
    id: Uuid,
    event: Event,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<Transitioned>, AppError> {
    let expected_version = body.and_then(|Json(request)| request.expected_version);
    let done = lifecycle::apply(state, id, event, expected_version, Utc::now())?;
    Ok(Json(done))
}
