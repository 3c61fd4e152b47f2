use serde::{Deserialize, Serialize};
use sqlx::{prelude::Type, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::plan::PlanTier;

/// Credits granted to every account on first authentication.
pub const DEFAULT_CREDIT_GRANT: i64 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "user_role")] // Matches the Postgres enum name
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

#[derive(Debug, FromRow, Serialize, Deserialize, Clone, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub profile_picture: Option<String>,
    pub role: UserRole,
    pub plan: PlanTier,
    pub credits_allocated: i64,
    pub credits_used: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_login: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Account {
    pub fn balance(&self) -> Balance {
        Balance::new(self.credits_allocated, self.credits_used)
    }
}

/// Snapshot of an account's credit position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub allocated: i64,
    pub used: i64,
    pub available: i64,
}

impl Balance {
    pub fn new(allocated: i64, used: i64) -> Self {
        Self {
            allocated,
            used,
            available: (allocated - used).max(0),
        }
    }
}

/// Identity data reported by the identity provider at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub profile_picture: Option<String>,
}
