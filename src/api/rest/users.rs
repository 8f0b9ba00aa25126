use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::actor::CurrentActor;
use crate::engine::dashboard::{self, Dashboard};
use crate::engine::payments;
use crate::error::AppError;
use crate::models::transaction::{MembershipPlan, Transaction};
use crate::models::user::{AccountState, Role, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/membership", patch(update_membership))
        .route("/users/:id/deactivate", post(deactivate_user))
        .route("/users/:id/packages", get(user_dashboard))
        .route("/membership-plans", post(create_plan).get(list_plans))
        .route("/memberships/checkout", post(checkout_membership))
        .route("/transactions/:id", get(get_transaction))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub apartment_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct UpdateMembershipRequest {
    pub is_member: bool,
    #[serde(default)]
    pub member_expiry_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub price: Decimal,
    pub duration_days: u32,
}

#[derive(Deserialize)]
pub struct MembershipCheckoutRequest {
    pub plan_id: Uuid,
}

/// Desk quick-create: a resident registered on the spot so a package can be
/// logged against them.
async fn create_user(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<User>, AppError> {
    actor.require_admin()?;

    let name = payload.name.trim().to_string();
    let phone = payload.phone.trim().to_string();
    if name.is_empty() || phone.is_empty() {
        return Err(AppError::BadRequest(
            "name and phone are required".to_string(),
        ));
    }
    if state.users.iter().any(|entry| entry.value().phone == phone) {
        return Err(AppError::Conflict(format!("phone {phone} is already registered")));
    }

    let user = User {
        id: Uuid::new_v4(),
        name,
        phone,
        unit: payload.unit,
        apartment_name: payload.apartment_name,
        role: payload.role.unwrap_or(Role::Resident),
        is_member: false,
        member_expiry_date: None,
        state: AccountState::Active,
        created_at: Utc::now(),
    };

    state.users.insert(user.id, user.clone());
    info!(user_id = %user.id, role = ?user.role, "user created");

    Ok(Json(user))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    actor.require_owner_or_staff(id)?;
    Ok(Json(state.user(id)?))
}

async fn update_membership(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMembershipRequest>,
) -> Result<Json<User>, AppError> {
    actor.require_admin()?;

    let mut user = state
        .users
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;

    user.is_member = payload.is_member;
    user.member_expiry_date = payload.member_expiry_date;

    info!(
        user_id = %user.id,
        is_member = user.is_member,
        expires_at = ?user.member_expiry_date,
        "membership updated"
    );

    Ok(Json(user.clone()))
}

async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    actor.require_admin()?;

    let mut user = state
        .users
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;

    if user.state != AccountState::Deactivated {
        user.state = AccountState::Deactivated;
        info!(user_id = %user.id, "user deactivated");
    }

    Ok(Json(user.clone()))
}

async fn user_dashboard(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Dashboard>, AppError> {
    actor.require_owner_or_staff(id)?;
    state.user(id)?;
    Ok(Json(dashboard::resident_dashboard(&state, id, Utc::now())))
}

async fn create_plan(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<CreatePlanRequest>,
) -> Result<Json<MembershipPlan>, AppError> {
    actor.require_admin()?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("plan name cannot be empty".to_string()));
    }
    if payload.price < Decimal::ZERO {
        return Err(AppError::BadRequest("plan price cannot be negative".to_string()));
    }
    if payload.duration_days == 0 {
        return Err(AppError::BadRequest(
            "plan duration must be at least one day".to_string(),
        ));
    }

    let plan = MembershipPlan {
        id: Uuid::new_v4(),
        name,
        price: payload.price,
        duration_days: payload.duration_days,
    };
    state.plans.insert(plan.id, plan.clone());
    info!(plan_id = %plan.id, plan = %plan.name, "membership plan created");

    Ok(Json(plan))
}

async fn list_plans(State(state): State<Arc<AppState>>) -> Json<Vec<MembershipPlan>> {
    let mut plans: Vec<MembershipPlan> = state
        .plans
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    plans.sort_by(|a, b| a.price.cmp(&b.price));
    Json(plans)
}

async fn checkout_membership(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<MembershipCheckoutRequest>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(payments::checkout_membership(
        &state,
        &actor,
        payload.plan_id,
        Utc::now(),
    )?))
}

async fn get_transaction(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = state
        .transactions
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("transaction {} not found", id)))?;
    actor.require_owner_or_staff(transaction.user_id)?;
    Ok(Json(transaction))
}
