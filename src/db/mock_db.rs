use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use uuid::Uuid;

use super::account_repository::{AccountRepository, AccountTotals, DebitOutcome, ProvisionOutcome};
use super::transaction_repository::{GrantOutcome, InsertOutcome, TransactionRepository};
use crate::models::account::{Account, Balance, IdentityProfile, UserRole, DEFAULT_CREDIT_GRANT};
use crate::models::plan::PlanTier;
use crate::models::transaction::{
    NewPaymentRejection, NewTransaction, PaymentRejection, Transaction, TransactionStatus,
};

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    transactions: HashMap<String, Transaction>,
    rejections: Vec<PaymentRejection>,
}

/// In-memory store for both repositories. Every operation runs under one
/// lock, which gives the same atomicity the Postgres statements provide.
#[derive(Clone, Default)]
pub struct MockDb {
    tables: Arc<Mutex<Tables>>,
    pub fail_inserts: Arc<AtomicBool>,
    pub fail_grants: Arc<AtomicBool>,
    pub insert_calls: Arc<AtomicUsize>,
    pub grant_calls: Arc<AtomicUsize>,
}

fn db_failure() -> sqlx::Error {
    sqlx::Error::Protocol("Mock DB failure".into())
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, user_id: Uuid, allocated: i64, used: i64) -> Self {
        self.seed_account(user_id, allocated, used, UserRole::User);
        self
    }

    pub fn seed_account(&self, user_id: Uuid, allocated: i64, used: i64, role: UserRole) {
        let now = OffsetDateTime::now_utc();
        self.tables.lock().unwrap().accounts.insert(
            user_id,
            Account {
                id: user_id,
                email: format!("{user_id}@example.com"),
                name: "Test User".into(),
                profile_picture: None,
                role,
                plan: PlanTier::Free,
                credits_allocated: allocated,
                credits_used: used,
                last_login: now,
                created_at: now,
            },
        );
    }

    pub fn account(&self, user_id: Uuid) -> Option<Account> {
        self.tables.lock().unwrap().accounts.get(&user_id).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.tables.lock().unwrap().accounts.len()
    }

    pub fn transaction(&self, transaction_id: &str) -> Option<Transaction> {
        self.tables
            .lock()
            .unwrap()
            .transactions
            .get(transaction_id)
            .cloned()
    }

    pub fn transaction_count(&self) -> usize {
        self.tables.lock().unwrap().transactions.len()
    }

    pub fn rejections(&self) -> Vec<PaymentRejection> {
        self.tables.lock().unwrap().rejections.clone()
    }
}

#[async_trait]
impl AccountRepository for MockDb {
    async fn provision_account(
        &self,
        profile: &IdentityProfile,
    ) -> Result<ProvisionOutcome, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        if let Some(existing) = tables.accounts.get_mut(&profile.id) {
            if !profile.email.is_empty() {
                existing.email = profile.email.clone();
            }
            if !profile.name.is_empty() {
                existing.name = profile.name.clone();
            }
            if profile.profile_picture.is_some() {
                existing.profile_picture = profile.profile_picture.clone();
            }
            existing.last_login = now;
            return Ok(ProvisionOutcome::Existing(existing.clone()));
        }

        let account = Account {
            id: profile.id,
            email: profile.email.clone(),
            name: profile.name.clone(),
            profile_picture: profile.profile_picture.clone(),
            role: UserRole::User,
            plan: PlanTier::Free,
            credits_allocated: DEFAULT_CREDIT_GRANT,
            credits_used: 0,
            last_login: now,
            created_at: now,
        };
        tables.accounts.insert(profile.id, account.clone());
        Ok(ProvisionOutcome::Created(account))
    }

    async fn find_account(&self, user_id: Uuid) -> Result<Option<Account>, sqlx::Error> {
        Ok(self.account(user_id))
    }

    async fn find_balance(&self, user_id: Uuid) -> Result<Option<Balance>, sqlx::Error> {
        Ok(self.account(user_id).map(|a| a.balance()))
    }

    async fn find_role(&self, user_id: Uuid) -> Result<Option<UserRole>, sqlx::Error> {
        Ok(self.account(user_id).map(|a| a.role))
    }

    async fn debit_credits(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<DebitOutcome, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        let Some(account) = tables.accounts.get_mut(&user_id) else {
            return Ok(DebitOutcome::NotFound);
        };
        if account.credits_allocated - account.credits_used < amount {
            return Ok(DebitOutcome::Insufficient(account.balance()));
        }
        account.credits_used += amount;
        Ok(DebitOutcome::Debited(account.balance()))
    }

    async fn list_accounts(&self, limit: i64, offset: i64) -> Result<Vec<Account>, sqlx::Error> {
        let tables = self.tables.lock().unwrap();
        let mut accounts: Vec<Account> = tables.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn account_totals(&self) -> Result<AccountTotals, sqlx::Error> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .accounts
            .values()
            .fold(AccountTotals::default(), |mut acc, a| {
                acc.total_users += 1;
                acc.credits_allocated += a.credits_allocated;
                acc.credits_used += a.credits_used;
                acc
            }))
    }
}

#[async_trait]
impl TransactionRepository for MockDb {
    async fn insert_transaction(
        &self,
        tx: &NewTransaction,
    ) -> Result<InsertOutcome, sqlx::Error> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(db_failure());
        }
        let mut tables = self.tables.lock().unwrap();
        if tables.transactions.contains_key(&tx.transaction_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        if !tables.accounts.contains_key(&tx.user_id) {
            return Ok(InsertOutcome::AccountMissing);
        }
        let row = Transaction {
            transaction_id: tx.transaction_id.clone(),
            user_id: tx.user_id,
            amount: tx.amount(),
            plan_type: tx.plan_type,
            status: tx.status,
            location: tx.location.clone(),
            credits: tx.credits,
            credits_granted_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        tables
            .transactions
            .insert(tx.transaction_id.clone(), row.clone());
        Ok(InsertOutcome::Inserted(row))
    }

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        Ok(self.transaction(transaction_id))
    }

    async fn apply_grant(&self, transaction_id: &str) -> Result<GrantOutcome, sqlx::Error> {
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(db_failure());
        }
        let mut tables = self.tables.lock().unwrap();
        let Some(tx) = tables.transactions.get(transaction_id).cloned() else {
            return Ok(GrantOutcome::NotGrantable);
        };
        if tx.status != TransactionStatus::Succeeded {
            return Ok(GrantOutcome::NotGrantable);
        }
        if tx.credits_granted_at.is_some() {
            return Ok(GrantOutcome::AlreadyApplied);
        }
        let Some(account) = tables.accounts.get_mut(&tx.user_id) else {
            return Ok(GrantOutcome::AccountMissing);
        };
        account.credits_allocated += tx.credits;
        account.plan = tx.plan_type;
        let balance = account.balance();
        if let Some(stored) = tables.transactions.get_mut(transaction_id) {
            stored.credits_granted_at = Some(OffsetDateTime::now_utc());
        }
        Ok(GrantOutcome::Applied(balance))
    }

    async fn list_pending_grants(&self, limit: i64) -> Result<Vec<Transaction>, sqlx::Error> {
        let tables = self.tables.lock().unwrap();
        let mut pending: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|t| t.grant_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn list_transactions_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn list_transactions(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Transaction> = tables.transactions.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn record_rejection(
        &self,
        rejection: &NewPaymentRejection,
    ) -> Result<(), sqlx::Error> {
        self.tables.lock().unwrap().rejections.push(PaymentRejection {
            id: Uuid::new_v4(),
            payment_id: rejection.payment_id.clone(),
            event_type: rejection.event_type.clone(),
            reason: rejection.reason.clone(),
            user_id: rejection.user_id.clone(),
            product_id: rejection.product_id.clone(),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn list_rejections(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentRejection>, sqlx::Error> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .rejections
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
