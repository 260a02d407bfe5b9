//! User repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

/// User record from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub subject: String,
    pub is_elevated: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// User repository.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find user by authenticated subject, or create if not exists.
    ///
    /// Uses a single atomic upsert to avoid TOCTOU race conditions on
    /// concurrent first-time logins from the same caller identity.
    pub async fn find_or_create(&self, subject: &str) -> Result<UserRow, StorageError> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (subject, last_seen_at)
            VALUES ($1, now())
            ON CONFLICT (subject) DO UPDATE SET last_seen_at = now()
            RETURNING id, subject, is_elevated, created_at, last_seen_at
            "#,
        )
        .bind(subject)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        Ok(user)
    }

    /// Get user by ID.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRow>, StorageError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, subject, is_elevated, created_at, last_seen_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)
    }
}
