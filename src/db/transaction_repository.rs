use async_trait::async_trait;
use uuid::Uuid;

use crate::models::account::Balance;
use crate::models::transaction::{
    NewPaymentRejection, NewTransaction, PaymentRejection, Transaction,
};

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Transaction),
    /// A row with the same transaction id already exists (including the
    /// losing side of a concurrent insert).
    AlreadyExists,
    /// The referenced account does not exist.
    AccountMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Applied(Balance),
    /// The grant for this transaction was applied earlier.
    AlreadyApplied,
    /// Nothing to grant: unknown transaction or not a succeeded payment.
    NotGrantable,
    /// The owning account does not exist yet; the grant stays pending.
    AccountMissing,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Atomic insert-if-absent keyed on `transaction_id`.
    async fn insert_transaction(&self, tx: &NewTransaction)
        -> Result<InsertOutcome, sqlx::Error>;

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, sqlx::Error>;

    /// Marks the transaction granted and adds its credits to the owning
    /// account in one storage transaction. Re-applying is a no-op.
    async fn apply_grant(&self, transaction_id: &str) -> Result<GrantOutcome, sqlx::Error>;

    async fn list_pending_grants(&self, limit: i64) -> Result<Vec<Transaction>, sqlx::Error>;

    async fn list_transactions_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error>;

    async fn list_transactions(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error>;

    async fn record_rejection(
        &self,
        rejection: &NewPaymentRejection,
    ) -> Result<(), sqlx::Error>;

    async fn list_rejections(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentRejection>, sqlx::Error>;
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23505")
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23503")
}

fn has_sqlstate(err: &sqlx::Error, state: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code == state;
        }
    }
    false
}
