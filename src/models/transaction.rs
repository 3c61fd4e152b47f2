use serde::{Deserialize, Serialize};
use sqlx::{prelude::Type, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::plan::PlanTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Succeeded,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
        }
    }
}

/// Append-only ledger row, keyed by the provider's payment id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub user_id: Uuid,
    /// Major currency units, e.g. "15.00".
    pub amount: String,
    pub plan_type: PlanTier,
    pub status: TransactionStatus,
    pub location: Option<String>,
    /// Credits this payment entitles the account to, resolved when recorded.
    pub credits: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub credits_granted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Transaction {
    /// A succeeded payment whose credits never reached the account.
    pub fn grant_pending(&self) -> bool {
        self.status == TransactionStatus::Succeeded && self.credits_granted_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub transaction_id: String,
    pub user_id: Uuid,
    pub amount_minor_units: i64,
    pub plan_type: PlanTier,
    pub status: TransactionStatus,
    pub location: Option<String>,
    pub credits: i64,
}

impl NewTransaction {
    pub fn amount(&self) -> String {
        format_minor_units(self.amount_minor_units)
    }
}

pub fn format_minor_units(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// A verified payment event that could not be credited.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct PaymentRejection {
    pub id: Uuid,
    pub payment_id: Option<String>,
    pub event_type: String,
    pub reason: String,
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentRejection {
    pub payment_id: Option<String>,
    pub event_type: String,
    pub reason: String,
    pub user_id: Option<String>,
    pub product_id: Option<String>,
}
