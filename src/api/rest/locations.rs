use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::actor::CurrentActor;
use crate::error::AppError;
use crate::models::location::{
    slugify, DeliveryFees, Location, LocationState, PriceConfig, PricingScheme,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/locations", post(create_location).get(list_locations))
        .route(
            "/locations/:id",
            get(get_location)
                .patch(update_location)
                .delete(retire_location),
        )
        .route("/location-slugs/:slug", get(get_location_by_slug))
}

#[derive(Deserialize)]
pub struct CreateLocationRequest {
    pub name: String,
    #[serde(default)]
    pub pricing_scheme: Option<String>,
    #[serde(default)]
    pub price_config: Option<serde_json::Value>,
    #[serde(default)]
    pub grace_period_days: Option<i64>,
    #[serde(default)]
    pub delivery: Option<DeliveryFees>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pricing_scheme: Option<String>,
    #[serde(default)]
    pub price_config: Option<serde_json::Value>,
    #[serde(default)]
    pub grace_period_days: Option<i64>,
    #[serde(default)]
    pub delivery: Option<DeliveryFees>,
}

fn grace_days(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

fn slug_taken(slug: &str) -> AppError {
    AppError::Conflict(format!("location slug {slug} already exists"))
}

async fn create_location(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<CreateLocationRequest>,
) -> Result<Json<Location>, AppError> {
    actor.require_admin()?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    let slug = slugify(&name);
    if slug.is_empty() {
        return Err(AppError::BadRequest(format!("name {name} yields an empty slug")));
    }

    let scheme = payload
        .pricing_scheme
        .unwrap_or_else(|| PricingScheme::Flat.as_str().to_string());
    let pricing = PriceConfig::from_raw(&scheme, payload.price_config)
        .map_err(|err| AppError::pricing(&slug, err))?;

    let Entry::Vacant(slot) = state.location_slugs.entry(slug.clone()) else {
        return Err(slug_taken(&slug));
    };

    let now = Utc::now();
    let location = Location {
        id: Uuid::new_v4(),
        name,
        slug,
        pricing,
        grace_period_days: grace_days(payload.grace_period_days.unwrap_or(0)),
        delivery: payload.delivery.unwrap_or_default(),
        state: LocationState::Active,
        created_at: now,
        updated_at: now,
    };

    state.locations.insert(location.id, location.clone());
    slot.insert(location.id);
    info!(location = %location.slug, scheme = %location.pricing.scheme(), "location created");

    Ok(Json(location))
}

async fn list_locations(State(state): State<Arc<AppState>>) -> Json<Vec<Location>> {
    let mut locations: Vec<Location> = state
        .locations
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    locations.sort_by(|a, b| a.name.cmp(&b.name));
    Json(locations)
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Location>, AppError> {
    Ok(Json(state.location(id)?))
}

async fn get_location_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Location>, AppError> {
    let id = state
        .location_slugs
        .get(&slug)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("location {} not found", slug)))?;
    Ok(Json(state.location(id)?))
}

/// Pricing edits only affect packages created afterwards; existing packages
/// keep their snapshotted base price.
async fn update_location(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Location>, AppError> {
    actor.require_admin()?;

    let current = state.location(id)?;

    let name = match payload.name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::BadRequest("name cannot be empty".to_string()));
        }
        Some(name) => name.trim().to_string(),
        None => current.name.clone(),
    };
    let slug = slugify(&name);
    if slug.is_empty() {
        return Err(AppError::BadRequest(format!("name {name} yields an empty slug")));
    }

    let pricing = current
        .pricing
        .updated(payload.pricing_scheme.as_deref(), payload.price_config)
        .map_err(|err| AppError::pricing(&current.slug, err))?;

    match state.location_slugs.entry(slug.clone()) {
        Entry::Occupied(owner) if *owner.get() != id => return Err(slug_taken(&slug)),
        Entry::Occupied(_) => {}
        Entry::Vacant(slot) => {
            slot.insert(id);
        }
    }

    let mut location = state
        .locations
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("location {} not found", id)))?;

    let previous_slug = std::mem::replace(&mut location.slug, slug);
    location.name = name;
    location.pricing = pricing;
    if let Some(grace) = payload.grace_period_days {
        location.grace_period_days = grace_days(grace);
    }
    if let Some(delivery) = payload.delivery {
        location.delivery = delivery;
    }
    location.updated_at = Utc::now();

    info!(location = %location.slug, scheme = %location.pricing.scheme(), "location updated");

    let updated = location.clone();
    drop(location);

    // Slug index entries are taken before the location guard, never under it.
    if previous_slug != updated.slug {
        state
            .location_slugs
            .remove_if(&previous_slug, |_, owner| *owner == id);
    }

    Ok(Json(updated))
}

/// Soft delete: packages keep referencing the location.
async fn retire_location(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Location>, AppError> {
    actor.require_admin()?;

    let mut location = state
        .locations
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("location {} not found", id)))?;

    if location.state != LocationState::Retired {
        location.state = LocationState::Retired;
        location.updated_at = Utc::now();
        info!(location = %location.slug, "location retired");
    }

    Ok(Json(location.clone()))
}
