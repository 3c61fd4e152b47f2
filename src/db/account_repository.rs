use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::account::{Account, Balance, IdentityProfile, UserRole};

#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    /// First sign-in: the account was inserted with the default grant.
    Created(Account),
    /// The account already existed; only profile and liveness fields changed.
    Existing(Account),
}

impl ProvisionOutcome {
    pub fn account(&self) -> &Account {
        match self {
            ProvisionOutcome::Created(account) | ProvisionOutcome::Existing(account) => account,
        }
    }

    pub fn into_account(self) -> Account {
        match self {
            ProvisionOutcome::Created(account) | ProvisionOutcome::Existing(account) => account,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited(Balance),
    Insufficient(Balance),
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountTotals {
    pub total_users: i64,
    pub credits_allocated: i64,
    pub credits_used: i64,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert-if-absent keyed on the identity id; the losing side of a race
    /// falls through to a profile update and never touches credits.
    async fn provision_account(
        &self,
        profile: &IdentityProfile,
    ) -> Result<ProvisionOutcome, sqlx::Error>;

    async fn find_account(&self, user_id: Uuid) -> Result<Option<Account>, sqlx::Error>;

    async fn find_balance(&self, user_id: Uuid) -> Result<Option<Balance>, sqlx::Error>;

    async fn find_role(&self, user_id: Uuid) -> Result<Option<UserRole>, sqlx::Error>;

    /// Conditional increment of `credits_used`, guarded by the stored balance.
    async fn debit_credits(&self, user_id: Uuid, amount: i64)
        -> Result<DebitOutcome, sqlx::Error>;

    async fn list_accounts(&self, limit: i64, offset: i64) -> Result<Vec<Account>, sqlx::Error>;

    async fn account_totals(&self) -> Result<AccountTotals, sqlx::Error>;
}
