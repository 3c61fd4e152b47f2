use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use tracing::warn;
use uuid::Uuid;

use crate::db::transaction_repository::{
    is_foreign_key_violation, is_unique_violation, GrantOutcome, InsertOutcome,
    TransactionRepository,
};
use crate::models::account::Balance;
use crate::models::plan::PlanTier;
use crate::models::transaction::{
    NewPaymentRejection, NewTransaction, PaymentRejection, Transaction, TransactionStatus,
};

const TRANSACTION_COLUMNS: &str = "transaction_id, user_id, amount::text AS amount, plan_type, \
     status, location, credits, credits_granted_at, created_at";

pub struct PostgresTransactionRepository {
    pub pool: PgPool,
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert_transaction(
        &self,
        tx: &NewTransaction,
    ) -> Result<InsertOutcome, sqlx::Error> {
        let result = sqlx::query_as::<Postgres, Transaction>(&format!(
            r#"
            INSERT INTO transactions (
                transaction_id, user_id, amount, plan_type, status, location, credits
            )
            VALUES ($1, $2, $3::numeric, $4, $5, $6, $7)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(&tx.transaction_id)
        .bind(tx.user_id)
        .bind(tx.amount())
        .bind(tx.plan_type)
        .bind(tx.status)
        .bind(tx.location.as_deref())
        .bind(tx.credits)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => Ok(InsertOutcome::Inserted(row)),
            Ok(None) => Ok(InsertOutcome::AlreadyExists),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::AlreadyExists),
            Err(err) if is_foreign_key_violation(&err) => {
                warn!(transaction_id = %tx.transaction_id, user_id = %tx.user_id, "transaction references unknown account");
                Ok(InsertOutcome::AccountMissing)
            }
            Err(err) => Err(err),
        }
    }

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn apply_grant(&self, transaction_id: &str) -> Result<GrantOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Claiming the grant row-locks the transaction, so a concurrent
        // apply blocks here and then sees credits_granted_at already set.
        let claimed = sqlx::query_as::<_, (Uuid, i64, PlanTier)>(
            r#"
            UPDATE transactions
            SET credits_granted_at = now()
            WHERE transaction_id = $1
              AND status = 'succeeded'::transaction_status
              AND credits_granted_at IS NULL
            RETURNING user_id, credits, plan_type
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, credits, plan)) = claimed else {
            tx.rollback().await?;
            return Ok(match self.find_transaction(transaction_id).await? {
                Some(existing)
                    if existing.status == TransactionStatus::Succeeded
                        && existing.credits_granted_at.is_some() =>
                {
                    GrantOutcome::AlreadyApplied
                }
                _ => GrantOutcome::NotGrantable,
            });
        };

        let updated = sqlx::query_as::<_, (i64, i64)>(
            r#"
            UPDATE users
            SET credits_allocated = credits_allocated + $2,
                plan = $3
            WHERE id = $1
            RETURNING credits_allocated, credits_used
            "#,
        )
        .bind(user_id)
        .bind(credits)
        .bind(plan)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some((allocated, used)) => {
                tx.commit().await?;
                Ok(GrantOutcome::Applied(Balance::new(allocated, used)))
            }
            None => {
                tx.rollback().await?;
                Ok(GrantOutcome::AccountMissing)
            }
        }
    }

    async fn list_pending_grants(&self, limit: i64) -> Result<Vec<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE status = 'succeeded'::transaction_status
              AND credits_granted_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_transactions_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_transactions(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn record_rejection(
        &self,
        rejection: &NewPaymentRejection,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO payment_rejections (
                id, payment_id, event_type, reason, user_id, product_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(rejection.payment_id.as_deref())
        .bind(&rejection.event_type)
        .bind(&rejection.reason)
        .bind(rejection.user_id.as_deref())
        .bind(rejection.product_id.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_rejections(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentRejection>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRejection>(
            r#"
            SELECT id, payment_id, event_type, reason, user_id, product_id, created_at
            FROM payment_rejections
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}
