//! Money: direct payment, gateway checkout and gateway settlement, for package
//! fees and membership purchases.

use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::fees::{resolve_payable, Payable};
use crate::engine::lifecycle::{self, Event, Outcome};
use crate::engine::penalty;
use crate::error::AppError;
use crate::gateway::{self, CallbackAction, GatewayCallback};
use crate::models::package::Package;
use crate::models::transaction::{Transaction, TransactionKind, TransactionStatus};
use crate::models::user::{Actor, User};
use crate::notify::{Notification, PackageEventKind};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub package: Package,
    pub transaction: Option<Transaction>,
    pub amount: Decimal,
    pub is_exempt: bool,
    /// The package was already paid; nothing was charged.
    pub already_paid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoverCheck {
    pub package: Package,
    pub payable: Payable,
    pub ready_for_handover: bool,
}

pub fn handover_check(
    state: &AppState,
    package_id: Uuid,
    now: DateTime<Utc>,
) -> Result<HandoverCheck, AppError> {
    let package = penalty::refresh_penalty(state, package_id, now)?;
    let owner = state.user(package.user_id)?;
    let payable = if package.is_paid() {
        Payable {
            amount: Decimal::ZERO,
            ..resolve_payable(&package, &owner, now)?
        }
    } else {
        resolve_payable(&package, &owner, now)?
    };

    Ok(HandoverCheck {
        ready_for_handover: package.is_paid(),
        package,
        payable,
    })
}

/// Settles a package fee in one step: accrue the penalty, price it, record a
/// paid transaction and move the package to PAID, all under the package's
/// write guard.
pub fn pay_package(
    state: &AppState,
    actor: &Actor,
    package_id: Uuid,
    now: DateTime<Utc>,
) -> Result<PaymentReceipt, AppError> {
    let start = Instant::now();
    let result = pay_locked(state, actor, package_id, now);
    state
        .metrics
        .record_transition(Event::Pay, &result, start.elapsed().as_secs_f64());

    match &result {
        Ok(receipt) if !receipt.already_paid => {
            state
                .metrics
                .payments_total
                .with_label_values(&[TransactionKind::PackageFee.as_label(), "paid"])
                .inc();
            state.publish(PackageEventKind::Paid, &receipt.package, now);
            state.notify(Notification::PaymentSucceeded {
                user_id: receipt.package.user_id,
                amount: receipt.amount,
                kind: TransactionKind::PackageFee,
            });
        }
        Ok(_) => {}
        Err(_) => state
            .metrics
            .payments_total
            .with_label_values(&[TransactionKind::PackageFee.as_label(), "rejected"])
            .inc(),
    }

    result
}

fn pay_locked(
    state: &AppState,
    actor: &Actor,
    package_id: Uuid,
    now: DateTime<Utc>,
) -> Result<PaymentReceipt, AppError> {
    let snapshot = state.package(package_id)?;
    actor.require_owner_or_staff(snapshot.user_id)?;
    let location = state.location(snapshot.location_id)?;
    let owner = state.user(snapshot.user_id)?;

    let mut entry = state
        .packages
        .get_mut(&package_id)
        .ok_or_else(|| AppError::NotFound(format!("package {} not found", package_id)))?;

    let (status, payment_status) = match lifecycle::next(entry.status, entry.payment_status, Event::Pay)? {
        Outcome::Move {
            status,
            payment_status,
        } => (status, payment_status),
        Outcome::Unchanged => {
            return Ok(PaymentReceipt {
                package: entry.clone(),
                transaction: None,
                amount: Decimal::ZERO,
                is_exempt: false,
                already_paid: true,
            });
        }
        Outcome::Delete => {
            return Err(AppError::Internal("pay cannot delete a package".to_string()));
        }
    };

    penalty::accrue(&mut entry, &location, now)
        .map_err(|err| AppError::pricing(&location.slug, err))?;
    let payable = resolve_payable(&entry, &owner, now)?;

    let transaction = Transaction {
        id: Uuid::new_v4(),
        user_id: owner.id,
        kind: TransactionKind::PackageFee,
        amount: payable.amount,
        status: TransactionStatus::Paid,
        package_id: Some(entry.id),
        plan_id: None,
        is_exempt: payable.is_exempt,
        created_at: now,
        paid_at: Some(now),
    };
    state.transactions.insert(transaction.id, transaction.clone());

    entry.status = status;
    entry.payment_status = payment_status;
    entry.touch(now);

    info!(
        package_id = %entry.id,
        receipt = %entry.receipt_number,
        amount = %payable.amount,
        is_exempt = payable.is_exempt,
        "package paid"
    );

    Ok(PaymentReceipt {
        package: entry.clone(),
        transaction: Some(transaction),
        amount: payable.amount,
        is_exempt: payable.is_exempt,
        already_paid: false,
    })
}

/// Opens a gateway payment for a package fee. Zero-amount (exempt) fees
/// settle immediately; otherwise a PENDING transaction waits for the signed
/// callback. An open checkout for the same amount is reused.
pub fn checkout_package(
    state: &AppState,
    actor: &Actor,
    package_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    let package = penalty::refresh_penalty(state, package_id, now)?;
    actor.require_owner_or_staff(package.user_id)?;

    if package.is_paid() {
        return Err(AppError::Conflict("package already paid".to_string()));
    }

    let owner = state.user(package.user_id)?;
    let payable = resolve_payable(&package, &owner, now)?;

    if payable.amount.is_zero() {
        let receipt = pay_package(state, actor, package_id, now)?;
        return receipt
            .transaction
            .ok_or_else(|| AppError::Conflict("package already paid".to_string()));
    }

    let mut reusable = None;
    for mut tx in state.transactions.iter_mut() {
        if tx.package_id == Some(package_id) && tx.status == TransactionStatus::Pending {
            if tx.amount == payable.amount && reusable.is_none() {
                reusable = Some(tx.clone());
            } else {
                // Superseded by a fresh amount.
                tx.status = TransactionStatus::Failed;
            }
        }
    }
    if let Some(tx) = reusable {
        return Ok(tx);
    }

    let transaction = pending_transaction(
        owner.id,
        TransactionKind::PackageFee,
        payable.amount,
        Some(package_id),
        None,
        now,
    );
    state.transactions.insert(transaction.id, transaction.clone());

    info!(
        transaction_id = %transaction.id,
        package_id = %package_id,
        amount = %transaction.amount,
        "package checkout opened"
    );

    Ok(transaction)
}

pub fn checkout_membership(
    state: &AppState,
    actor: &Actor,
    plan_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    let plan = state
        .plans
        .get(&plan_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("membership plan {} not found", plan_id)))?;
    let user = state.user(actor.user_id)?;

    let transaction = pending_transaction(
        user.id,
        TransactionKind::MembershipBuy,
        plan.price,
        None,
        Some(plan.id),
        now,
    );
    state.transactions.insert(transaction.id, transaction.clone());

    info!(
        transaction_id = %transaction.id,
        plan = %plan.name,
        amount = %plan.price,
        "membership checkout opened"
    );

    Ok(transaction)
}

fn pending_transaction(
    user_id: Uuid,
    kind: TransactionKind,
    amount: Decimal,
    package_id: Option<Uuid>,
    plan_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        user_id,
        kind,
        amount,
        status: TransactionStatus::Pending,
        package_id,
        plan_id,
        is_exempt: false,
        created_at: now,
        paid_at: None,
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Settled,
    Failed,
    /// Redelivery of an already-final transaction, or a status we do not act on.
    Ignored,
}

/// Handles a signed gateway callback. Nothing is trusted before the signature
/// checks out.
pub fn handle_callback(
    state: &AppState,
    callback: &GatewayCallback,
    now: DateTime<Utc>,
) -> Result<CallbackOutcome, AppError> {
    gateway::verify(callback, &state.payment_server_key)?;

    let transaction_id = Uuid::from_str(&callback.order_id)
        .map_err(|_| AppError::BadRequest(format!("unknown order id {}", callback.order_id)))?;

    let action = gateway::action(callback);
    if action == CallbackAction::Ignore {
        info!(transaction_id = %transaction_id, status = %callback.transaction_status, "gateway callback ignored");
        return Ok(CallbackOutcome::Ignored);
    }

    // Flip the transaction under its own guard and release it before touching
    // the package or the user.
    let transaction = {
        let mut tx = state.transactions.get_mut(&transaction_id).ok_or_else(|| {
            AppError::NotFound(format!("transaction {} not found", transaction_id))
        })?;

        if tx.status != TransactionStatus::Pending {
            return Ok(CallbackOutcome::Ignored);
        }

        if action == CallbackAction::Fail {
            tx.status = TransactionStatus::Failed;
            state
                .metrics
                .payments_total
                .with_label_values(&[tx.kind.as_label(), "failed"])
                .inc();
            info!(transaction_id = %tx.id, status = %callback.transaction_status, "transaction failed");
            return Ok(CallbackOutcome::Failed);
        }

        let gross = Decimal::from_str(callback.gross_amount.trim()).map_err(|_| {
            AppError::BadRequest(format!("invalid gross amount {}", callback.gross_amount))
        })?;
        if gross != tx.amount {
            return Err(AppError::BadRequest(format!(
                "gross amount {} does not match transaction amount {}",
                gross, tx.amount
            )));
        }

        tx.status = TransactionStatus::Paid;
        tx.paid_at = Some(now);
        tx.clone()
    };

    state
        .metrics
        .payments_total
        .with_label_values(&[transaction.kind.as_label(), "paid"])
        .inc();

    match transaction.kind {
        TransactionKind::PackageFee => settle_package_fee(state, &transaction, now),
        TransactionKind::MembershipBuy => {
            // The transaction is already PAID and redeliveries are ignored, so a
            // failure here cannot be retried by the gateway.
            if let Err(err) = settle_membership(state, &transaction, now) {
                error!(
                    transaction_id = %transaction.id,
                    user_id = %transaction.user_id,
                    error = %err,
                    "settled membership payment could not be applied; refund required"
                );
                return Ok(CallbackOutcome::Settled);
            }
        }
    }

    state.notify(Notification::PaymentSucceeded {
        user_id: transaction.user_id,
        amount: transaction.amount,
        kind: transaction.kind,
    });

    Ok(CallbackOutcome::Settled)
}

fn settle_package_fee(state: &AppState, transaction: &Transaction, now: DateTime<Utc>) {
    let Some(package_id) = transaction.package_id else {
        error!(transaction_id = %transaction.id, "package fee transaction without a package");
        return;
    };

    let start = Instant::now();
    let result = mark_package_settled(state, package_id, now);
    state
        .metrics
        .record_transition(Event::Pay, &result, start.elapsed().as_secs_f64());

    match result {
        Ok(Some(package)) => {
            info!(
                package_id = %package.id,
                receipt = %package.receipt_number,
                transaction_id = %transaction.id,
                "package paid via gateway"
            );
            state.publish(PackageEventKind::Paid, &package, now);
        }
        Ok(None) => warn!(
            package_id = %package_id,
            transaction_id = %transaction.id,
            "settlement for an already paid package; refund required"
        ),
        Err(err) => error!(
            package_id = %package_id,
            transaction_id = %transaction.id,
            error = %err,
            "settled payment could not be applied; refund required"
        ),
    }
}

fn mark_package_settled(
    state: &AppState,
    package_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Package>, AppError> {
    let mut entry = state
        .packages
        .get_mut(&package_id)
        .ok_or_else(|| AppError::NotFound(format!("package {} not found", package_id)))?;

    match lifecycle::next(entry.status, entry.payment_status, Event::Pay)? {
        Outcome::Move {
            status,
            payment_status,
        } => {
            entry.status = status;
            entry.payment_status = payment_status;
            entry.touch(now);
            Ok(Some(entry.clone()))
        }
        Outcome::Unchanged | Outcome::Delete => Ok(None),
    }
}

fn settle_membership(
    state: &AppState,
    transaction: &Transaction,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let plan_id = transaction.plan_id.ok_or_else(|| {
        AppError::Internal(format!("membership transaction {} without a plan", transaction.id))
    })?;
    let duration_days = state
        .plans
        .get(&plan_id)
        .map(|plan| plan.duration_days)
        .ok_or_else(|| AppError::NotFound(format!("membership plan {} not found", plan_id)))?;

    let mut user = state
        .users
        .get_mut(&transaction.user_id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", transaction.user_id)))?;

    let expiry = extend_membership(&user, duration_days, now);
    user.is_member = true;
    user.member_expiry_date = Some(expiry);

    info!(user_id = %user.id, expires_at = %expiry, "membership extended");
    Ok(())
}

/// New expiry after buying `duration_days`: stacked on an unexpired
/// membership, otherwise counted from `now`.
pub fn extend_membership(user: &User, duration_days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let base = match user.member_expiry_date {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    base + Duration::days(i64::from(duration_days))
}
