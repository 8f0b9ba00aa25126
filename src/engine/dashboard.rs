use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::engine::penalty;
use crate::models::package::{Package, PackageStatus};
use crate::state::AppState;

const RECENT_COMPLETED: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub pending: Vec<Package>,
    pub completed: Vec<Package>,
}

/// A resident's packages: everything still at the desk, with penalties brought
/// up to date, plus the most recent handovers.
pub fn resident_dashboard(state: &AppState, user_id: Uuid, now: DateTime<Utc>) -> Dashboard {
    let owned: Vec<Package> = state
        .packages
        .iter()
        .filter(|entry| entry.value().user_id == user_id)
        .map(|entry| entry.value().clone())
        .collect();

    let mut pending = Vec::new();
    let mut completed = Vec::new();

    for package in owned {
        match package.status {
            PackageStatus::PendingPickup | PackageStatus::Paid => {
                // A broken location config must not hide the package; show the
                // stored penalty instead.
                let refreshed = match penalty::refresh_penalty(state, package.id, now) {
                    Ok(fresh) => fresh,
                    Err(err) => {
                        warn!(package_id = %package.id, error = %err, "penalty refresh failed on dashboard");
                        package
                    }
                };
                pending.push(refreshed);
            }
            PackageStatus::Completed => completed.push(package),
            PackageStatus::Returned => {}
        }
    }

    pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    completed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    completed.truncate(RECENT_COMPLETED);

    Dashboard { pending, completed }
}
