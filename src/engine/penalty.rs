use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::pricing::{evaluate, hours_between, PricingInput};
use crate::error::{AppError, PricingError};
use crate::models::location::Location;
use crate::models::package::Package;
use crate::state::AppState;

pub fn stale_penalty(
    package: &Package,
    location: &Location,
    now: DateTime<Utc>,
) -> Result<Option<Decimal>, PricingError> {
    // Frozen once paid.
    if package.is_paid() {
        return Ok(None);
    }

    let quote = evaluate(&PricingInput {
        config: &location.pricing,
        grace_period_days: location.grace_period_days,
        hours_elapsed: hours_between(package.created_at, now),
        size: package.size,
        daily_ordinal: Some(package.daily_ordinal),
    })?;

    if quote.penalty_fee > package.penalty_fee {
        Ok(Some(quote.penalty_fee))
    } else {
        if quote.penalty_fee < package.penalty_fee {
            debug!(
                package_id = %package.id,
                stored = %package.penalty_fee,
                computed = %quote.penalty_fee,
                "computed penalty below stored value; keeping stored"
            );
        }
        Ok(None)
    }
}

/// Brings an entry the caller already holds up to date. Returns whether it
/// was written.
pub fn accrue(
    package: &mut Package,
    location: &Location,
    now: DateTime<Utc>,
) -> Result<bool, PricingError> {
    match stale_penalty(package, location, now)? {
        Some(penalty_fee) => {
            package.penalty_fee = penalty_fee;
            package.touch(now);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Recomputes a package's penalty on read and persists it only when it moved.
/// Concurrent callers compute the same number, and a writer that finds an
/// equal or higher stored value leaves it alone.
pub fn refresh_penalty(
    state: &AppState,
    package_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Package, AppError> {
    let snapshot = state.package(package_id)?;
    if snapshot.is_paid() {
        return Ok(snapshot);
    }

    let location = state.location(snapshot.location_id)?;
    let Some(penalty_fee) = stale_penalty(&snapshot, &location, now)
        .map_err(|err| AppError::pricing(&location.slug, err))?
    else {
        return Ok(snapshot);
    };

    let mut entry = state
        .packages
        .get_mut(&package_id)
        .ok_or_else(|| AppError::NotFound(format!("package {} not found", package_id)))?;

    if entry.is_paid() || entry.penalty_fee >= penalty_fee {
        return Ok(entry.clone());
    }

    entry.penalty_fee = penalty_fee;
    entry.touch(now);
    state.metrics.penalty_updates_total.inc();

    info!(
        package_id = %entry.id,
        receipt = %entry.receipt_number,
        penalty_fee = %entry.penalty_fee,
        "penalty updated"
    );

    Ok(entry.clone())
}

pub async fn run_penalty_sweep(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "penalty sweep started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let updated = sweep_once(&state, Utc::now());
        if updated > 0 {
            info!(updated, "penalty sweep finished");
        }
    }
}

pub fn sweep_once(state: &AppState, now: DateTime<Utc>) -> usize {
    let unpaid: Vec<(Uuid, Decimal)> = state
        .packages
        .iter()
        .filter(|entry| !entry.value().is_paid())
        .map(|entry| (*entry.key(), entry.value().penalty_fee))
        .collect();

    let mut updated = 0;
    for (package_id, before) in unpaid {
        match refresh_penalty(state, package_id, now) {
            Ok(package) if package.penalty_fee != before => updated += 1,
            Ok(_) => {}
            Err(AppError::NotFound(_)) => {}
            Err(err) => warn!(package_id = %package_id, error = %err, "penalty sweep skipped package"),
        }
    }

    updated
}
