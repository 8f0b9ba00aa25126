use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;
use crate::models::package::Package;
use crate::models::user::User;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payable {
    pub amount: Decimal,
    pub is_exempt: bool,
    pub base_price: Decimal,
    pub penalty_fee: Decimal,
    pub delivery_fee: Decimal,
}

/// What the owner owes for a package right now. Active members owe nothing.
pub fn resolve_payable(
    package: &Package,
    owner: &User,
    now: DateTime<Utc>,
) -> Result<Payable, AppError> {
    let is_exempt = owner.membership_active(now);
    let delivery_fee = package.delivery_fee.unwrap_or(Decimal::ZERO);
    let amount = if is_exempt {
        Decimal::ZERO
    } else {
        package
            .base_price
            .checked_add(package.penalty_fee)
            .and_then(|sum| sum.checked_add(delivery_fee))
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "amount owed for package {} is out of range",
                    package.receipt_number
                ))
            })?
    };

    Ok(Payable {
        amount,
        is_exempt,
        base_price: package.base_price,
        penalty_fee: package.penalty_fee,
        delivery_fee,
    })
}
