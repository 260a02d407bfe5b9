//! Extraction run repository: the database-row lock that serializes
//! concurrent extractions for the same (user, course) pair (§4.3, §5).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExtractionRunRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub source_file_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub input_hash: String,
    pub status: String,
    pub result: Option<serde_json::Value>,
}

/// Outcome of attempting to acquire the extraction lock.
#[derive(Debug, Clone)]
pub enum LockOutcome {
    /// No fresh running extraction existed; a new run was created.
    Acquired(Uuid),
    /// A fresh running extraction already holds the lock.
    InProgress(Uuid),
}

#[derive(Clone)]
pub struct ExtractionRepository {
    pool: PgPool,
}

impl ExtractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attempts to acquire the per-(user, course) extraction lock.
    ///
    /// A `running` row younger than `stale_seconds` blocks the new request
    /// (`InProgress`). An older one is forcibly failed with `"Job timed out"`
    /// and the new run proceeds (opportunistic sweep, §5) — all within one
    /// transaction so readers never observe two `running` rows at once.
    pub async fn acquire_lock(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        input_hash: &str,
        source_file_id: Option<Uuid>,
        stale_seconds: i64,
    ) -> Result<LockOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Query)?;

        let existing = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            SELECT id, created_at FROM extraction_runs
            WHERE user_id = $1 AND course_id = $2 AND status = 'running'
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        if let Some((run_id, created_at)) = existing {
            let age_seconds = (Utc::now() - created_at).num_seconds();
            if age_seconds < stale_seconds {
                tx.commit().await.map_err(StorageError::Query)?;
                return Ok(LockOutcome::InProgress(run_id));
            }

            sqlx::query(
                r#"
                UPDATE extraction_runs SET status = 'failed',
                    result = jsonb_build_object('error', 'Job timed out')
                WHERE id = $1
                "#,
            )
            .bind(run_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Query)?;
        }

        let new_run_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO extraction_runs (user_id, course_id, source_file_id, input_hash, status)
            VALUES ($1, $2, $3, $4, 'running')
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(source_file_id)
        .bind(input_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        tx.commit().await.map_err(StorageError::Query)?;
        Ok(LockOutcome::Acquired(new_run_id))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ExtractionRunRow>, StorageError> {
        sqlx::query_as::<_, ExtractionRunRow>(
            r#"
            SELECT id, user_id, course_id, source_file_id, created_at, input_hash, status, result
            FROM extraction_runs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Terminal status transition (`completed`, `needs_review`, or `failed`)
    /// with the final result payload.
    pub async fn finalize(
        &self,
        id: Uuid,
        status: &str,
        result: serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE extraction_runs SET status = $2, result = $3 WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(result)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }

    /// Fails a run with a descriptive message, for timeout/cancellation and
    /// unexpected-exception exit paths.
    pub async fn mark_failed(&self, id: Uuid, message: &str) -> Result<(), StorageError> {
        self.finalize(id, "failed", serde_json::json!({ "error": message }))
            .await
    }

    /// Fraction of terminal runs created since `since` that did not fail —
    /// used by the health check to gauge the model gateway without issuing
    /// a model call of its own (§6.3).
    pub async fn recent_success_rate(&self, since: DateTime<Utc>) -> Result<f64, StorageError> {
        let (total, failed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT count(*) FILTER (WHERE status != 'running') AS total,
                   count(*) FILTER (WHERE status = 'failed') AS failed
            FROM extraction_runs WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        if total == 0 {
            return Ok(1.0);
        }
        Ok((total - failed) as f64 / total as f64)
    }
}
