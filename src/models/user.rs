use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Resident,
    Staff,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountState {
    Active,
    Deactivated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub unit: Option<String>,
    pub apartment_name: Option<String>,
    pub role: Role,
    pub is_member: bool,
    pub member_expiry_date: Option<DateTime<Utc>>,
    pub state: AccountState,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Membership counts only while the flag is set and the expiry is strictly
    /// after `now`.
    pub fn membership_active(&self, now: DateTime<Utc>) -> bool {
        self.is_member
            && self
                .member_expiry_date
                .is_some_and(|expiry| expiry > now)
    }
}

/// The resolved caller of an operation. Passed explicitly; nothing reads it
/// from ambient session state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden("staff access required".to_string()))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin access required".to_string()))
        }
    }

    /// Residents may act on their own records; staff on anyone's.
    pub fn require_owner_or_staff(&self, owner_id: Uuid) -> Result<(), AppError> {
        if self.user_id == owner_id || self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden("not your record".to_string()))
        }
    }
}
