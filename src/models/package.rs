use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PackageSize {
    #[serde(alias = "SMALL")]
    S,
    #[serde(alias = "MEDIUM")]
    M,
    #[serde(alias = "LARGE")]
    L,
    #[serde(alias = "EXTRA_LARGE")]
    XL,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    PendingPickup,
    Paid,
    Completed,
    Returned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub receipt_number: String,
    pub courier_name: String,
    pub size: Option<PackageSize>,
    pub user_id: Uuid,
    pub location_id: Uuid,
    pub status: PackageStatus,
    pub payment_status: PaymentStatus,
    /// Snapshot of the location's price when the package arrived.
    pub base_price: Decimal,
    pub penalty_fee: Decimal,
    pub delivery_fee: Option<Decimal>,
    pub proof_photo_url: Option<String>,
    /// Position of this package among the location's arrivals in its day window.
    pub daily_ordinal: u32,
    /// Bumped on every write; callers may pass it back to detect lost updates.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Package {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}
