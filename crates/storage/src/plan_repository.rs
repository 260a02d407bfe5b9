//! Study plan repository: versioned persistence of a generated schedule
//! (§4.6 "Plan persistence").

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_version: i32,
    pub validation_passed: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlanDayRow {
    pub date: NaiveDate,
    pub total_hours: f64,
    pub is_off_day: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlanItemRow {
    pub date: NaiveDate,
    pub sequence_order: i32,
    pub topic_id: Uuid,
    pub course_id: Uuid,
    pub allocated_hours: f64,
    pub is_review: bool,
}

/// A day to persist, with its items.
#[derive(Debug, Clone)]
pub struct NewPlanDay {
    pub date: NaiveDate,
    pub total_hours: f64,
    pub is_off_day: bool,
    pub items: Vec<NewPlanItem>,
}

#[derive(Debug, Clone)]
pub struct NewPlanItem {
    pub topic_id: Uuid,
    pub course_id: Uuid,
    pub allocated_hours: f64,
    pub sequence_order: i32,
    pub is_review: bool,
}

#[derive(Clone)]
pub struct PlanRepository {
    pool: PgPool,
}

impl PlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new plan version atomically: future-dated days of prior
    /// versions are deleted first (deleting their items via cascade);
    /// past-dated days of prior versions are left untouched as history.
    pub async fn persist_plan(
        &self,
        owner_id: Uuid,
        validation_passed: bool,
        days: &[NewPlanDay],
        today: NaiveDate,
    ) -> Result<PlanRow, StorageError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Query)?;

        let next_version: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(plan_version), 0) + 1 FROM study_plans WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        sqlx::query("DELETE FROM study_plan_days WHERE owner_id = $1 AND date >= $2")
            .bind(owner_id)
            .bind(today)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Query)?;

        let plan: PlanRow = sqlx::query_as(
            r#"
            INSERT INTO study_plans (owner_id, plan_version, validation_passed)
            VALUES ($1, $2, $3)
            RETURNING id, owner_id, plan_version, validation_passed
            "#,
        )
        .bind(owner_id)
        .bind(next_version)
        .bind(validation_passed)
        .fetch_one(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        for day in days {
            sqlx::query(
                r#"
                INSERT INTO study_plan_days (plan_id, owner_id, date, plan_version, total_hours, is_off_day)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(plan.id)
            .bind(owner_id)
            .bind(day.date)
            .bind(next_version)
            .bind(day.total_hours)
            .bind(day.is_off_day)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Query)?;

            for item in &day.items {
                sqlx::query(
                    r#"
                    INSERT INTO study_plan_items
                        (owner_id, date, plan_version, sequence_order, topic_id, course_id, allocated_hours, is_review)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(owner_id)
                .bind(day.date)
                .bind(next_version)
                .bind(item.sequence_order)
                .bind(item.topic_id)
                .bind(item.course_id)
                .bind(item.allocated_hours)
                .bind(item.is_review)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::Query)?;
            }
        }

        tx.commit().await.map_err(StorageError::Query)?;
        Ok(plan)
    }

    /// The most recent plan version for a user, with its days and items.
    pub async fn get_latest_plan(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<(PlanRow, Vec<PlanDayRow>, Vec<PlanItemRow>)>, StorageError> {
        let plan: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, plan_version, validation_passed FROM study_plans
            WHERE owner_id = $1 ORDER BY plan_version DESC LIMIT 1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        let Some(plan) = plan else {
            return Ok(None);
        };

        let days = sqlx::query_as::<_, PlanDayRow>(
            "SELECT date, total_hours, is_off_day FROM study_plan_days \
             WHERE owner_id = $1 AND plan_version = $2 ORDER BY date ASC",
        )
        .bind(owner_id)
        .bind(plan.plan_version)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        let items = sqlx::query_as::<_, PlanItemRow>(
            "SELECT date, sequence_order, topic_id, course_id, allocated_hours, is_review \
             FROM study_plan_items WHERE owner_id = $1 AND plan_version = $2 \
             ORDER BY date ASC, sequence_order ASC",
        )
        .bind(owner_id)
        .bind(plan.plan_version)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        Ok(Some((plan, days, items)))
    }
}
