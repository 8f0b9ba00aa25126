use chrono::{DateTime, FixedOffset, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::location::Location;
use crate::models::package::Package;
use crate::models::transaction::{MembershipPlan, Transaction};
use crate::models::user::User;
use crate::notify::{Dispatcher, Notification, PackageEvent, PackageEventKind};
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub locations: DashMap<Uuid, Location>,
    /// Unique index: location slug -> location id. Names that differ only in
    /// case share a slug, so this also keeps names unique.
    pub location_slugs: DashMap<String, Uuid>,
    pub users: DashMap<Uuid, User>,
    pub packages: DashMap<Uuid, Package>,
    /// Unique index: receipt number -> package id.
    pub receipts: DashMap<String, Uuid>,
    pub transactions: DashMap<Uuid, Transaction>,
    pub plans: DashMap<Uuid, MembershipPlan>,
    pub package_events_tx: broadcast::Sender<PackageEvent>,
    pub notifications: Dispatcher,
    pub metrics: Metrics,
    pub local_offset: FixedOffset,
    pub payment_server_key: String,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let (package_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            locations: DashMap::new(),
            location_slugs: DashMap::new(),
            users: DashMap::new(),
            packages: DashMap::new(),
            receipts: DashMap::new(),
            transactions: DashMap::new(),
            plans: DashMap::new(),
            package_events_tx,
            notifications: Dispatcher::default(),
            metrics: Metrics::new(),
            local_offset: config.local_offset,
            payment_server_key: config.payment_server_key.clone(),
        }
    }

    pub fn with_notifications(mut self, notifications: Dispatcher) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn package(&self, id: Uuid) -> Result<Package, AppError> {
        self.packages
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("package {} not found", id)))
    }

    pub fn package_by_receipt(&self, receipt_number: &str) -> Result<Package, AppError> {
        let id = self
            .receipts
            .get(receipt_number)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                AppError::NotFound(format!("package with receipt {receipt_number} not found"))
            })?;
        self.package(id)
    }

    pub fn location(&self, id: Uuid) -> Result<Location, AppError> {
        self.locations
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("location {} not found", id)))
    }

    pub fn user(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))
    }

    pub fn notify(&self, notification: Notification) {
        self.notifications.dispatch(&notification, &self.metrics);
    }

    pub fn publish(&self, kind: PackageEventKind, package: &Package, at: DateTime<Utc>) {
        let _ = self.package_events_tx.send(PackageEvent {
            kind,
            package_id: package.id,
            receipt_number: package.receipt_number.clone(),
            location_id: package.location_id,
            user_id: package.user_id,
            at,
        });
    }
}
