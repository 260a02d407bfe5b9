//! Dev-only per-user extraction quota ledger. The real credit/billing
//! system is an external collaborator this core does not own; this table
//! stands in for it during development and testing.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

#[derive(Clone)]
pub struct QuotaRepository {
    pool: PgPool,
}

impl QuotaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Topics already counted against today's quota for this user.
    pub async fn used_today(&self, user_id: Uuid, today: NaiveDate) -> Result<i64, StorageError> {
        let used: Option<i64> = sqlx::query_scalar(
            "SELECT topics_used FROM quota_usage WHERE user_id = $1 AND usage_date = $2",
        )
        .bind(user_id)
        .bind(today)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(used.unwrap_or(0))
    }

    /// Adds `count` to today's usage, resetting the counter if the stored
    /// row is from a previous day.
    pub async fn record_usage(
        &self,
        user_id: Uuid,
        today: NaiveDate,
        count: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO quota_usage (user_id, usage_date, topics_used)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                topics_used = CASE
                    WHEN quota_usage.usage_date = $2 THEN quota_usage.topics_used + $3
                    ELSE $3
                END,
                usage_date = $2
            "#,
        )
        .bind(user_id)
        .bind(today)
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }
}
