//! User schedule preferences repository (§3): daily capacity, weekly off
//! days, and blackout dates the Generate Plan handler reads per request.

use std::collections::HashSet;

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use study_scheduler_domain::UserSchedulePreferences;

use crate::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PreferencesRow {
    pub daily_capacity_hours: f64,
    pub weekly_off_days: Vec<String>,
    pub blackout_dates: Vec<NaiveDate>,
}

impl From<PreferencesRow> for UserSchedulePreferences {
    fn from(row: PreferencesRow) -> Self {
        Self {
            daily_capacity_hours: row.daily_capacity_hours,
            weekly_off_days: row.weekly_off_days.into_iter().collect(),
            blackout_dates: row.blackout_dates.into_iter().collect(),
        }
    }
}

#[derive(Clone)]
pub struct PreferencesRepository {
    pool: PgPool,
}

impl PreferencesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reads the caller's stored preferences, falling back to the default
    /// (3.0h/day, no off days, no blackout dates) when none have been set.
    pub async fn get_for_user(&self, user_id: Uuid) -> Result<UserSchedulePreferences, StorageError> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            "SELECT daily_capacity_hours, weekly_off_days, blackout_dates \
             FROM user_schedule_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        Ok(row.map(UserSchedulePreferences::from).unwrap_or_default())
    }

    /// Upserts the caller's preferences.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        daily_capacity_hours: f64,
        weekly_off_days: &HashSet<String>,
        blackout_dates: &HashSet<NaiveDate>,
    ) -> Result<(), StorageError> {
        let off_days: Vec<String> = weekly_off_days.iter().cloned().collect();
        let blackouts: Vec<NaiveDate> = blackout_dates.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO user_schedule_preferences
                (user_id, daily_capacity_hours, weekly_off_days, blackout_dates, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (user_id) DO UPDATE SET
                daily_capacity_hours = $2,
                weekly_off_days = $3,
                blackout_dates = $4,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(daily_capacity_hours)
        .bind(&off_days)
        .bind(&blackouts)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        Ok(())
    }
}
