use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::account_repository::{
    AccountRepository, AccountTotals, DebitOutcome, ProvisionOutcome,
};
use crate::models::account::{Account, Balance, IdentityProfile, UserRole, DEFAULT_CREDIT_GRANT};

const ACCOUNT_COLUMNS: &str = "id, email, name, profile_picture, role, plan, \
     credits_allocated, credits_used, last_login, created_at";

pub struct PostgresAccountRepository {
    pub pool: PgPool,
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn provision_account(
        &self,
        profile: &IdentityProfile,
    ) -> Result<ProvisionOutcome, sqlx::Error> {
        let inserted = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO users (
                id, email, name, profile_picture, role, plan,
                credits_allocated, credits_used, last_login
            )
            VALUES ($1, $2, $3, $4, 'user'::user_role, 'free'::plan_tier, $5, 0, now())
            ON CONFLICT (id) DO NOTHING
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(profile.profile_picture.as_deref())
        .bind(DEFAULT_CREDIT_GRANT)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(account) = inserted {
            return Ok(ProvisionOutcome::Created(account));
        }

        // Existing identity: refresh profile and liveness only.
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE users
            SET email = CASE WHEN $2 <> '' THEN $2 ELSE email END,
                name = CASE WHEN $3 <> '' THEN $3 ELSE name END,
                profile_picture = COALESCE($4, profile_picture),
                last_login = now()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(profile.profile_picture.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(ProvisionOutcome::Existing(account))
    }

    async fn find_account(&self, user_id: Uuid) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_balance(&self, user_id: Uuid) -> Result<Option<Balance>, sqlx::Error> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT credits_allocated, credits_used FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(allocated, used)| Balance::new(allocated, used)))
    }

    async fn find_role(&self, user_id: Uuid) -> Result<Option<UserRole>, sqlx::Error> {
        sqlx::query_scalar::<_, UserRole>("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn debit_credits(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<DebitOutcome, sqlx::Error> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            UPDATE users
            SET credits_used = credits_used + $2
            WHERE id = $1
              AND credits_allocated - credits_used >= $2
            RETURNING credits_allocated, credits_used
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((allocated, used)) = row {
            return Ok(DebitOutcome::Debited(Balance::new(allocated, used)));
        }

        Ok(match self.find_balance(user_id).await? {
            Some(balance) => DebitOutcome::Insufficient(balance),
            None => DebitOutcome::NotFound,
        })
    }

    async fn list_accounts(&self, limit: i64, offset: i64) -> Result<Vec<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn account_totals(&self) -> Result<AccountTotals, sqlx::Error> {
        let (total_users, credits_allocated, credits_used) =
            sqlx::query_as::<_, (i64, i64, i64)>(
                r#"
                SELECT COUNT(*)::BIGINT,
                       COALESCE(SUM(credits_allocated), 0)::BIGINT,
                       COALESCE(SUM(credits_used), 0)::BIGINT
                FROM users
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(AccountTotals {
            total_users,
            credits_allocated,
            credits_used,
        })
    }
}
