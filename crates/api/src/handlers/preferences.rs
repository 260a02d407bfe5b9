//! Schedule preferences endpoint (§3): lets a caller set the daily
//! capacity, weekly off days, and blackout dates the Generate Plan
//! handler reads on every request.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use study_scheduler_domain::{DomainError, UserSchedulePreferences};

use crate::AppState;
use crate::middleware::auth::AuthUser;
use crate::validation::weekdays;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePreferencesRequest {
    #[validate(range(min = 0.01))]
    pub daily_capacity_hours: f64,
    #[serde(default)]
    #[validate(custom(function = "weekdays"))]
    pub weekly_off_days: HashSet<String>,
    #[serde(default)]
    pub blackout_dates: HashSet<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub daily_capacity_hours: f64,
    pub weekly_off_days: HashSet<String>,
    pub blackout_dates: HashSet<NaiveDate>,
}

impl From<UserSchedulePreferences> for PreferencesResponse {
    fn from(prefs: UserSchedulePreferences) -> Self {
        Self {
            daily_capacity_hours: prefs.daily_capacity_hours,
            weekly_off_days: prefs.weekly_off_days,
            blackout_dates: prefs.blackout_dates,
        }
    }
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, DomainError> {
    let prefs = state
        .preferences_repo
        .get_for_user(user_id)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(PreferencesResponse::from(prefs)))
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UpdatePreferencesRequest>,
) -> Result<impl IntoResponse, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    state
        .preferences_repo
        .upsert(
            user_id,
            req.daily_capacity_hours,
            &req.weekly_off_days,
            &req.blackout_dates,
        )
        .await
        .map_err(anyhow::Error::from)?;

    Ok(Json(PreferencesResponse {
        daily_capacity_hours: req.daily_capacity_hours,
        weekly_off_days: req.weekly_off_days,
        blackout_dates: req.blackout_dates,
    }))
}
