use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::daily_counter;
use crate::engine::pricing::{evaluate, PricingInput};
use crate::error::AppError;
use crate::models::package::{Package, PackageSize, PackageStatus, PaymentStatus};
use crate::models::user::{AccountState, Actor};
use crate::notify::{Notification, PackageEventKind};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewPackage {
    pub receipt_number: String,
    pub courier_name: String,
    pub user_id: Uuid,
    pub location_id: Uuid,
    #[serde(default)]
    pub size: Option<PackageSize>,
    #[serde(default)]
    pub proof_photo_url: Option<String>,
    /// Staff override of the location's base price.
    #[serde(default)]
    pub custom_base_price: Option<Decimal>,
}

/// Records a courier drop-off. The base price is fixed here and never
/// follows later changes to the location's pricing.
pub fn create_package(
    state: &AppState,
    actor: &Actor,
    new: NewPackage,
    now: DateTime<Utc>,
) -> Result<Package, AppError> {
    actor.require_staff()?;

    let receipt_number = new.receipt_number.trim().to_string();
    if receipt_number.is_empty() {
        return Err(AppError::BadRequest("receipt number cannot be empty".to_string()));
    }
    if new.courier_name.trim().is_empty() {
        return Err(AppError::BadRequest("courier name cannot be empty".to_string()));
    }

    let location = state.location(new.location_id)?;
    if !location.is_active() {
        return Err(AppError::BadRequest(format!(
            "location {} is no longer accepting packages",
            location.slug
        )));
    }

    let owner = state.user(new.user_id)?;
    if owner.state != AccountState::Active {
        return Err(AppError::BadRequest(format!("user {} is deactivated", owner.id)));
    }
    if let Some(apartment) = &owner.apartment_name {
        if !apartment.eq_ignore_ascii_case(&location.name) {
            return Err(AppError::BadRequest(format!(
                "recipient lives at {apartment}, not {}",
                location.name
            )));
        }
    }

    let daily_ordinal =
        daily_counter::next_ordinal(state, location.id, now, state.local_offset);
    let quote = evaluate(&PricingInput {
        config: &location.pricing,
        grace_period_days: location.grace_period_days,
        hours_elapsed: 0.0,
        size: new.size,
        daily_ordinal: Some(daily_ordinal),
    })
    .map_err(|err| AppError::pricing(&location.slug, err))?;

    let base_price = new
        .custom_base_price
        .map(|price| price.max(Decimal::ZERO))
        .unwrap_or(quote.base_price);

    let package = Package {
        id: Uuid::new_v4(),
        receipt_number: receipt_number.clone(),
        courier_name: new.courier_name.trim().to_string(),
        size: new.size,
        user_id: owner.id,
        location_id: location.id,
        status: PackageStatus::PendingPickup,
        payment_status: PaymentStatus::Unpaid,
        base_price,
        penalty_fee: Decimal::ZERO,
        delivery_fee: None,
        proof_photo_url: new.proof_photo_url,
        daily_ordinal,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    match state.receipts.entry(receipt_number) {
        Entry::Occupied(existing) => {
            return Err(AppError::Conflict(format!(
                "duplicate receipt number {}",
                existing.key()
            )));
        }
        Entry::Vacant(slot) => {
            state.packages.insert(package.id, package.clone());
            slot.insert(package.id);
        }
    }

    state.metrics.packages_created_total.inc();
    info!(
        package_id = %package.id,
        receipt = %package.receipt_number,
        location = %location.slug,
        base_price = %package.base_price,
        daily_ordinal,
        "package received"
    );

    state.publish(PackageEventKind::Created, &package, now);
    state.notify(Notification::PackageArrived {
        user_id: owner.id,
        receipt_number: package.receipt_number.clone(),
        location_name: location.name.clone(),
    });

    Ok(package)
}

pub fn request_delivery(
    state: &AppState,
    actor: &Actor,
    package_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Package, AppError> {
    let snapshot = state.package(package_id)?;
    actor.require_owner_or_staff(snapshot.user_id)?;

    let location = state.location(snapshot.location_id)?;
    if !location.delivery.enabled {
        return Err(AppError::BadRequest(format!(
            "location {} does not offer delivery",
            location.slug
        )));
    }
    let size = snapshot.size.ok_or_else(|| {
        AppError::BadRequest("package size is required to price delivery".to_string())
    })?;
    let fee = location.delivery.fee(size);

    let mut entry = state
        .packages
        .get_mut(&package_id)
        .ok_or_else(|| AppError::NotFound(format!("package {} not found", package_id)))?;

    if entry.is_paid() {
        return Err(AppError::Conflict("package already paid".to_string()));
    }
    if entry.status != PackageStatus::PendingPickup {
        return Err(AppError::Conflict(format!(
            "delivery cannot be added to a package in status {:?}",
            entry.status
        )));
    }

    if entry.delivery_fee != Some(fee) {
        entry.delivery_fee = Some(fee);
        entry.touch(now);
        info!(package_id = %entry.id, delivery_fee = %fee, "delivery requested");
    }

    Ok(entry.clone())
}
