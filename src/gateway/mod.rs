//! Payment gateway callbacks.
//!
//! The gateway signs each callback with
//! `hex(sha512(order_id + status_code + gross_amount + server_key))`.

use serde::Deserialize;
use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayCallback {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment gateway key is not configured")]
    NotConfigured,

    #[error("invalid signature")]
    InvalidSignature,
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Forbidden(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Settle,
    Fail,
    Ignore,
}

pub fn signature(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify(callback: &GatewayCallback, server_key: &str) -> Result<(), GatewayError> {
    if server_key.is_empty() {
        return Err(GatewayError::NotConfigured);
    }

    let expected = signature(
        &callback.order_id,
        &callback.status_code,
        &callback.gross_amount,
        server_key,
    );

    if constant_time_eq(expected.as_bytes(), callback.signature_key.to_ascii_lowercase().as_bytes()) {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn action(callback: &GatewayCallback) -> CallbackAction {
    match callback.transaction_status.as_str() {
        "settlement" => CallbackAction::Settle,
        "capture" if callback.fraud_status.as_deref() == Some("accept") => CallbackAction::Settle,
        "cancel" | "deny" | "expire" => CallbackAction::Fail,
        _ => CallbackAction::Ignore,
    }
}
