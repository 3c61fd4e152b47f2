//! Reconciles payment events against account credit balances.
//!
//! All correctness guarantees live in the repositories: the transaction insert
//! is an insert-if-absent keyed on the payment id, and every balance change is
//! a single conditional statement. The ledger itself holds no mutable state.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::{Product, ProductCatalog};
use crate::db::account_repository::{AccountRepository, DebitOutcome, ProvisionOutcome};
use crate::db::transaction_repository::{GrantOutcome, InsertOutcome, TransactionRepository};
use crate::models::account::{Balance, IdentityProfile};
use crate::models::transaction::{NewPaymentRejection, NewTransaction, TransactionStatus};
use crate::services::dodo::{PaymentDetails, PaymentEvent};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("payment {payment_id} is recorded but its credits were not granted: {reason}")]
    GrantPending { payment_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DebitError {
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance { available: i64, requested: i64 },
    #[error("debit amount must be positive")]
    InvalidAmount,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    MissingData { missing: Vec<&'static str> },
    UnknownProduct { product_id: String },
    UnknownAccount { user_id: String },
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingData { .. } => "missing_data",
            RejectReason::UnknownProduct { .. } => "unknown_product",
            RejectReason::UnknownAccount { .. } => "unknown_account",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingData { missing } => {
                write!(f, "missing data: {}", missing.join(", "))
            }
            RejectReason::UnknownProduct { product_id } => {
                write!(f, "unknown product: {product_id}")
            }
            RejectReason::UnknownAccount { user_id } => write!(f, "unknown account: {user_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Ignored {
        event_type: String,
    },
    Rejected(RejectReason),
    /// The payment id was already recorded. `regranted` is set when this
    /// delivery completed a grant that an earlier attempt left pending.
    Duplicate {
        payment_id: String,
        regranted: Option<Balance>,
    },
    RecordedFailure {
        payment_id: String,
    },
    Granted {
        payment_id: String,
        balance: Balance,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub applied: usize,
    pub failed: usize,
}

struct ValidatedPayment<'a> {
    payment_id: &'a str,
    user_id: Uuid,
    product_id: &'a str,
    product: Product,
}

pub struct CreditLedger {
    accounts: Arc<dyn AccountRepository>,
    transactions: Arc<dyn TransactionRepository>,
    catalog: ProductCatalog,
}

impl CreditLedger {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        transactions: Arc<dyn TransactionRepository>,
        catalog: ProductCatalog,
    ) -> Self {
        Self {
            accounts,
            transactions,
            catalog,
        }
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub async fn apply_payment_event(
        &self,
        event: &PaymentEvent,
    ) -> Result<ApplyOutcome, LedgerError> {
        let (details, status) = match event {
            PaymentEvent::PaymentSucceeded(d) => (d, TransactionStatus::Succeeded),
            PaymentEvent::PaymentFailed(d) => (d, TransactionStatus::Failed),
            PaymentEvent::Other { event_type } => {
                info!(%event_type, "ignoring webhook event");
                return Ok(ApplyOutcome::Ignored {
                    event_type: event_type.clone(),
                });
            }
        };

        let payment = match self.validate(details) {
            Ok(payment) => payment,
            Err(reason) => return self.reject(event, details, reason).await,
        };

        let new_tx = NewTransaction {
            transaction_id: payment.payment_id.to_string(),
            user_id: payment.user_id,
            amount_minor_units: details.total_amount,
            plan_type: payment.product.plan,
            status,
            location: details.billing_country.clone(),
            credits: payment.product.credits,
        };

        match self.transactions.insert_transaction(&new_tx).await? {
            InsertOutcome::Inserted(_) => {}
            InsertOutcome::AlreadyExists => return self.handle_duplicate(payment.payment_id).await,
            InsertOutcome::AccountMissing => {
                let reason = RejectReason::UnknownAccount {
                    user_id: payment.user_id.to_string(),
                };
                return self.reject(event, details, reason).await;
            }
        }

        if status == TransactionStatus::Failed {
            info!(
                payment_id = payment.payment_id,
                user_id = %payment.user_id,
                "recorded failed payment"
            );
            return Ok(ApplyOutcome::RecordedFailure {
                payment_id: payment.payment_id.to_string(),
            });
        }

        let balance = self.grant(payment.payment_id).await?;
        info!(
            payment_id = payment.payment_id,
            user_id = %payment.user_id,
            product_id = payment.product_id,
            plan = %payment.product.plan,
            credits = payment.product.credits,
            allocated = balance.allocated,
            "granted credits"
        );
        Ok(ApplyOutcome::Granted {
            payment_id: payment.payment_id.to_string(),
            balance,
        })
    }

    fn validate<'a>(&self, details: &'a PaymentDetails) -> Result<ValidatedPayment<'a>, RejectReason> {
        let mut missing = Vec::new();
        if details.payment_id.is_none() {
            missing.push("payment_id");
        }
        if details.user_id.is_none() {
            missing.push("user_id");
        }
        if details.product_id.is_none() {
            missing.push("product_id");
        }
        let (Some(payment_id), Some(user_id), Some(product_id)) = (
            details.payment_id.as_deref(),
            details.user_id.as_deref(),
            details.product_id.as_deref(),
        ) else {
            return Err(RejectReason::MissingData { missing });
        };

        let product = self
            .catalog
            .resolve(product_id)
            .ok_or_else(|| RejectReason::UnknownProduct {
                product_id: product_id.to_string(),
            })?;

        let user_id = Uuid::parse_str(user_id).map_err(|_| RejectReason::UnknownAccount {
            user_id: user_id.to_string(),
        })?;

        Ok(ValidatedPayment {
            payment_id,
            user_id,
            product_id,
            product,
        })
    }

    async fn reject(
        &self,
        event: &PaymentEvent,
        details: &PaymentDetails,
        reason: RejectReason,
    ) -> Result<ApplyOutcome, LedgerError> {
        error!(
            event_type = event.event_type(),
            payment_id = ?details.payment_id,
            user_id = ?details.user_id,
            product_id = ?details.product_id,
            reason = %reason,
            "payment event rejected; needs manual follow-up"
        );
        self.transactions
            .record_rejection(&NewPaymentRejection {
                payment_id: details.payment_id.clone(),
                event_type: event.event_type().to_string(),
                reason: reason.to_string(),
                user_id: details.user_id.clone(),
                product_id: details.product_id.clone(),
            })
            .await?;
        Ok(ApplyOutcome::Rejected(reason))
    }

    async fn handle_duplicate(&self, payment_id: &str) -> Result<ApplyOutcome, LedgerError> {
        let pending = self
            .transactions
            .find_transaction(payment_id)
            .await?
            .is_some_and(|tx| tx.grant_pending());

        let regranted = if pending {
            warn!(payment_id, "redelivered payment has a pending grant; retrying");
            Some(self.grant(payment_id).await?)
        } else {
            info!(payment_id, "duplicate payment delivery ignored");
            None
        };

        Ok(ApplyOutcome::Duplicate {
            payment_id: payment_id.to_string(),
            regranted,
        })
    }

    /// Applies the grant for a recorded, succeeded transaction. Any failure
    /// leaves the transaction pending for reconciliation.
    async fn grant(&self, payment_id: &str) -> Result<Balance, LedgerError> {
        let outcome = match self.transactions.apply_grant(payment_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(?err, payment_id, "credit grant failed; transaction left pending");
                return Err(LedgerError::GrantPending {
                    payment_id: payment_id.to_string(),
                    reason: err.to_string(),
                });
            }
        };

        match outcome {
            GrantOutcome::Applied(balance) => Ok(balance),
            GrantOutcome::AlreadyApplied => {
                // A concurrent delivery or the reconciler got there first.
                let tx = self.transactions.find_transaction(payment_id).await?;
                let balance = match tx {
                    Some(tx) => self.get_balance(tx.user_id).await?,
                    None => Balance::default(),
                };
                Ok(balance)
            }
            other => {
                error!(payment_id, outcome = ?other, "credit grant could not be applied");
                Err(LedgerError::GrantPending {
                    payment_id: payment_id.to_string(),
                    reason: format!("{other:?}"),
                })
            }
        }
    }

    pub async fn reconcile_pending_grants(&self, limit: i64) -> Result<ReconcileReport, LedgerError> {
        let pending = self.transactions.list_pending_grants(limit).await?;
        let mut report = ReconcileReport {
            examined: pending.len(),
            ..Default::default()
        };

        for tx in pending {
            match self.grant(&tx.transaction_id).await {
                Ok(balance) => {
                    report.applied += 1;
                    info!(
                        payment_id = %tx.transaction_id,
                        user_id = %tx.user_id,
                        allocated = balance.allocated,
                        "reconciled pending grant"
                    );
                }
                Err(_) => report.failed += 1,
            }
        }

        if report.examined > 0 {
            info!(?report, "grant reconciliation finished");
        }
        Ok(report)
    }

    pub async fn debit(&self, user_id: Uuid, amount: i64) -> Result<Balance, DebitError> {
        if amount <= 0 {
            return Err(DebitError::InvalidAmount);
        }

        match self.accounts.debit_credits(user_id, amount).await? {
            DebitOutcome::Debited(balance) => {
                info!(%user_id, amount, available = balance.available, "debited credits");
                Ok(balance)
            }
            DebitOutcome::Insufficient(balance) => Err(DebitError::InsufficientBalance {
                available: balance.available,
                requested: amount,
            }),
            DebitOutcome::NotFound => Err(DebitError::InsufficientBalance {
                available: 0,
                requested: amount,
            }),
        }
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<Balance, sqlx::Error> {
        Ok(self
            .accounts
            .find_balance(user_id)
            .await?
            .unwrap_or_default())
    }

    pub async fn provision_account(
        &self,
        profile: &IdentityProfile,
    ) -> Result<ProvisionOutcome, LedgerError> {
        let outcome = self.accounts.provision_account(profile).await?;
        if let ProvisionOutcome::Created(account) = &outcome {
            info!(
                user_id = %account.id,
                credits = account.credits_allocated,
                "provisioned new account"
            );
        }
        Ok(outcome)
    }
}
