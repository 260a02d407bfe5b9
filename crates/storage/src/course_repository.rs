//! Course and topic repositories: the queryable/mutable surface beneath
//! the extraction and scheduling pipelines.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CourseRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub exam_date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CourseRepository {
    pool: PgPool,
}

impl CourseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        owner_id: Uuid,
        title: &str,
        exam_date: NaiveDate,
    ) -> Result<CourseRow, StorageError> {
        sqlx::query_as::<_, CourseRow>(
            r#"
            INSERT INTO courses (owner_id, title, exam_date)
            VALUES ($1, $2, $3)
            RETURNING id, owner_id, title, exam_date, status, created_at
            "#,
        )
        .bind(owner_id)
        .bind(title)
        .bind(exam_date)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CourseRow>, StorageError> {
        sqlx::query_as::<_, CourseRow>(
            "SELECT id, owner_id, title, exam_date, status, created_at FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Courses owned by `owner_id`, optionally restricted to `active` ones.
    pub async fn list_for_user(
        &self,
        owner_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<CourseRow>, StorageError> {
        let query = if active_only {
            "SELECT id, owner_id, title, exam_date, status, created_at FROM courses \
             WHERE owner_id = $1 AND status = 'active' ORDER BY exam_date ASC"
        } else {
            "SELECT id, owner_id, title, exam_date, status, created_at FROM courses \
             WHERE owner_id = $1 ORDER BY exam_date ASC"
        };
        sqlx::query_as::<_, CourseRow>(query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Query)
    }

    pub async fn update_status(&self, id: Uuid, status: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE courses SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopicRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub topic_key: String,
    pub title: String,
    pub difficulty_weight: i32,
    pub exam_importance: i32,
    pub estimated_hours: f64,
    pub confidence_level: String,
    pub notes: Option<String>,
    pub source_page: Option<i32>,
    pub source_quote: Option<String>,
    pub prerequisite_ids: Vec<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TopicRepository {
    pool: PgPool,
}

impl TopicRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes all topics of a course — the `replace`-mode first step, run
    /// inside the same transaction as the subsequent insertion.
    pub async fn delete_for_course_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        course_id: Uuid,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM topics WHERE course_id = $1")
            .bind(course_id)
            .execute(&mut **tx)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }

    /// Inserts one sanitized, stably-identified topic. Prerequisite ids are
    /// inserted empty and resolved in the bounded second pass.
    pub async fn insert_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        topic: &crate::course_repository::NewTopic,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO topics (
                id, course_id, topic_key, title, difficulty_weight, exam_importance,
                estimated_hours, confidence_level, notes, source_page, source_quote, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(topic.id)
        .bind(topic.course_id)
        .bind(&topic.topic_key)
        .bind(&topic.title)
        .bind(topic.difficulty_weight)
        .bind(topic.exam_importance)
        .bind(topic.estimated_hours)
        .bind(&topic.confidence_level)
        .bind(&topic.notes)
        .bind(topic.source_page)
        .bind(&topic.source_quote)
        .bind(&topic.status)
        .execute(&mut **tx)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    /// Second-pass prerequisite-edge update for a single topic. Callers
    /// batch these with bounded parallelism (5 at a time).
    pub async fn update_prerequisite_ids(
        &self,
        topic_id: Uuid,
        prerequisite_ids: &[Uuid],
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE topics SET prerequisite_ids = $2 WHERE id = $1")
            .bind(topic_id)
            .bind(prerequisite_ids)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }

    pub async fn list_for_course(&self, course_id: Uuid) -> Result<Vec<TopicRow>, StorageError> {
        sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT id, course_id, topic_key, title, difficulty_weight, exam_importance,
                   estimated_hours, confidence_level, notes, source_page, source_quote,
                   prerequisite_ids, status, created_at
            FROM topics WHERE course_id = $1
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Pending (not `done`) topics across a set of courses, for plan generation.
    pub async fn list_pending_for_courses(
        &self,
        course_ids: &[Uuid],
    ) -> Result<Vec<TopicRow>, StorageError> {
        sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT id, course_id, topic_key, title, difficulty_weight, exam_importance,
                   estimated_hours, confidence_level, notes, source_page, source_quote,
                   prerequisite_ids, status, created_at
            FROM topics WHERE course_id = ANY($1) AND status != 'done'
            "#,
        )
        .bind(course_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn update_status(&self, id: Uuid, status: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE topics SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }

    pub async fn update_fields(
        &self,
        id: Uuid,
        title: Option<&str>,
        notes: Option<&str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE topics SET
                title = COALESCE($2, title),
                notes = COALESCE($3, notes)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(notes)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }
}

/// A sanitized, stably-identified topic ready for first-pass insertion
/// (prerequisite ids resolved separately, in the bounded second pass).
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub id: Uuid,
    pub course_id: Uuid,
    pub topic_key: String,
    pub title: String,
    pub difficulty_weight: i32,
    pub exam_importance: i32,
    pub estimated_hours: f64,
    pub confidence_level: String,
    pub notes: Option<String>,
    pub source_page: Option<i32>,
    pub source_quote: Option<String>,
    pub status: String,
}
