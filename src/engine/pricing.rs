//! Fee computation for the four location pricing schemes.
//!
//! Everything here is pure: callers supply the dwell time and, where a scheme
//! needs them, the package size and the package's ordinal within the
//! location's day window.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::PricingError;
use crate::models::location::{PenaltyMode, PriceConfig};
use crate::models::package::PackageSize;

const HOURS_PER_DAY: f64 = 24.0;

#[derive(Debug, Clone, Copy)]
pub struct PricingInput<'a> {
    pub config: &'a PriceConfig,
    pub grace_period_days: u32,
    pub hours_elapsed: f64,
    pub size: Option<PackageSize>,
    /// 1-based. `None` is treated as the first package of the day.
    pub daily_ordinal: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub base_price: Decimal,
    pub penalty_fee: Decimal,
    pub billable_days: u32,
}

pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0);
    millis as f64 / 3_600_000.0
}

/// Whole 24h blocks elapsed after the grace period. A dwell time exactly on
/// the grace boundary bills nothing.
pub fn billable_days(hours_elapsed: f64, grace_period_days: u32) -> u32 {
    if !hours_elapsed.is_finite() {
        return 0;
    }

    let grace_hours = f64::from(grace_period_days) * HOURS_PER_DAY;
    let hours_over = (hours_elapsed - grace_hours).max(0.0);
    let days = (hours_over / HOURS_PER_DAY).floor();

    if days >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        days as u32
    }
}

pub fn evaluate(input: &PricingInput<'_>) -> Result<Quote, PricingError> {
    let days = billable_days(input.hours_elapsed, input.grace_period_days);
    let (base_price, daily_rate) = rates(input)?;

    let penalty_fee = daily_rate
        .max(Decimal::ZERO)
        .checked_mul(Decimal::from(days))
        .ok_or_else(|| PricingError::MalformedConfig {
            scheme: input.config.scheme(),
            reason: format!("penalty rate {daily_rate} over {days} days is out of range"),
        })?;

    Ok(Quote {
        base_price: base_price.max(Decimal::ZERO),
        penalty_fee,
        billable_days: days,
    })
}

fn rates(input: &PricingInput<'_>) -> Result<(Decimal, Decimal), PricingError> {
    match input.config {
        PriceConfig::Flat(config) => Ok((config.base_price, config.penalty_per24h)),
        PriceConfig::FlatSize(config) => {
            let size = input
                .size
                .ok_or(PricingError::MissingSize(input.config.scheme()))?;
            let rate = config.rate(size);
            Ok((rate.base, rate.penalty))
        }
        PriceConfig::ProgressiveDay(config) => {
            Ok((config.day1_price, config.day2_and_after_price))
        }
        PriceConfig::ProgressivePackage(config) => {
            let is_first = input.daily_ordinal.unwrap_or(1) <= 1;
            let base = if is_first {
                config.first_package_price
            } else {
                config.additional_package_price
            };
            let penalty = match config.penalty_mode {
                PenaltyMode::FirstPackage => config.first_package_price,
                PenaltyMode::AdditionalPackage => config.additional_package_price,
            };
            Ok((base, penalty))
        }
    }
}
