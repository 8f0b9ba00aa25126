//! Package status / payment status transitions.
//!
//! `next` is the transition table. `apply` runs it against the store for the
//! staff and admin events; paying goes through `engine::payments` because it
//! also has to record money.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, LifecycleError};
use crate::models::package::{Package, PackageStatus, PaymentStatus};
use crate::notify::PackageEventKind;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Pay,
    Destroy,
    Handover,
    MarkPaid,
    Return,
}

impl Event {
    pub fn as_label(&self) -> &'static str {
        match self {
            Event::Pay => "pay",
            Event::Destroy => "destroy",
            Event::Handover => "handover",
            Event::MarkPaid => "mark_paid",
            Event::Return => "return",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Move {
        status: PackageStatus,
        payment_status: PaymentStatus,
    },
    /// Already in the target state; nothing is written.
    Unchanged,
    Delete,
}

pub fn next(
    status: PackageStatus,
    payment_status: PaymentStatus,
    event: Event,
) -> Result<Outcome, LifecycleError> {
    use PackageStatus as S;
    use PaymentStatus as P;

    if status == S::Returned {
        return Err(LifecycleError::AlreadyReturned);
    }

    let outcome = match (event, status, payment_status) {
        (Event::Pay, _, P::Paid) => Outcome::Unchanged,
        (Event::Pay, S::PendingPickup | S::Paid, P::Unpaid) => Outcome::Move {
            status: S::Paid,
            payment_status: P::Paid,
        },
        (Event::Pay, _, P::Unpaid) => return Err(LifecycleError::AlreadyCompleted),

        (Event::Destroy, S::Completed, _) => return Err(LifecycleError::AlreadyCompleted),
        (Event::Destroy, _, P::Paid) => return Err(LifecycleError::AlreadyPaid),
        (Event::Destroy, _, P::Unpaid) => Outcome::Delete,

        (Event::Handover, _, P::Unpaid) => return Err(LifecycleError::NotPaid),
        (Event::Handover, S::Completed, P::Paid) => Outcome::Unchanged,
        (Event::Handover, _, P::Paid) => Outcome::Move {
            status: S::Completed,
            payment_status: P::Paid,
        },

        (Event::MarkPaid, S::Completed, _) => return Err(LifecycleError::AlreadyCompleted),
        (Event::MarkPaid, S::Paid, P::Paid) => Outcome::Unchanged,
        (Event::MarkPaid, _, _) => Outcome::Move {
            status: S::Paid,
            payment_status: P::Paid,
        },

        (Event::Return, _, payment_status) => Outcome::Move {
            status: S::Returned,
            payment_status,
        },
    };

    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
pub struct Transitioned {
    pub package: Package,
    pub changed: bool,
}

fn check_version(package: &Package, expected_version: Option<u64>) -> Result<(), AppError> {
    match expected_version {
        Some(expected) if expected != package.version => Err(AppError::Conflict(format!(
            "package {} was modified (version {} != {}); re-read and retry",
            package.id, package.version, expected
        ))),
        _ => Ok(()),
    }
}

/// Runs a non-payment event against a stored package. The entry's write guard
/// is held across check and write, so two events on one package serialize.
pub fn apply(
    state: &AppState,
    package_id: Uuid,
    event: Event,
    expected_version: Option<u64>,
    now: DateTime<Utc>,
) -> Result<Transitioned, AppError> {
    if event == Event::Pay {
        return Err(AppError::Internal(
            "pay must go through the payment flow".to_string(),
        ));
    }

    let start = Instant::now();
    let result = apply_locked(state, package_id, event, expected_version, now);
    state.metrics.record_transition(event, &result, start.elapsed().as_secs_f64());

    if let Ok(done) = &result {
        if done.changed {
            let kind = match event {
                Event::Destroy => PackageEventKind::Destroyed,
                Event::Handover => PackageEventKind::HandedOver,
                Event::MarkPaid | Event::Pay => PackageEventKind::Paid,
                Event::Return => PackageEventKind::Returned,
            };
            state.publish(kind, &done.package, now);
        }
    }

    result
}

fn apply_locked(
    state: &AppState,
    package_id: Uuid,
    event: Event,
    expected_version: Option<u64>,
    now: DateTime<Utc>,
) -> Result<Transitioned, AppError> {
    let mut entry = state
        .packages
        .get_mut(&package_id)
        .ok_or_else(|| AppError::NotFound(format!("package {} not found", package_id)))?;

    check_version(&entry, expected_version)?;

    match next(entry.status, entry.payment_status, event)? {
        Outcome::Unchanged => Ok(Transitioned {
            package: entry.clone(),
            changed: false,
        }),
        Outcome::Move {
            status,
            payment_status,
        } => {
            entry.status = status;
            entry.payment_status = payment_status;
            entry.touch(now);

            info!(
                package_id = %entry.id,
                receipt = %entry.receipt_number,
                event = event.as_label(),
                status = ?entry.status,
                "package transitioned"
            );

            Ok(Transitioned {
                package: entry.clone(),
                changed: true,
            })
        }
        Outcome::Delete => {
            let seen_version = entry.version;
            drop(entry);

            // Compare-and-delete: only remove the record we validated.
            let (_, removed) = state
                .packages
                .remove_if(&package_id, |_, package| package.version == seen_version)
                .ok_or_else(|| {
                    AppError::Conflict(format!(
                        "package {} changed while being destroyed; re-read and retry",
                        package_id
                    ))
                })?;

            state.receipts.remove(&removed.receipt_number);

            info!(
                package_id = %removed.id,
                receipt = %removed.receipt_number,
                "package destroyed"
            );

            Ok(Transitioned {
                package: removed,
                changed: true,
            })
        }
    }
}
