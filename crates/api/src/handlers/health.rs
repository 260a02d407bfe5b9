//! Health check (§6.3): unauthenticated, reports per-check status for
//! storage and the model gateway (derived from recent job success rate,
//! never a live model call).

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;

use study_scheduler_storage::check_connection;

use crate::AppState;

/// Model gateway is considered degraded below this recent success rate.
const DEGRADED_SUCCESS_RATE: f64 = 0.8;
/// And unhealthy below this one.
const UNHEALTHY_SUCCESS_RATE: f64 = 0.5;
/// Window over which recent extraction outcomes are sampled.
const SUCCESS_RATE_WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: CheckStatus,
    database: CheckStatus,
    model_gateway: CheckStatus,
    storage: CheckStatus,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match check_connection(&state.pool).await {
        Ok(()) => CheckStatus::Healthy,
        Err(e) => {
            tracing::error!("health check: database unreachable: {e}");
            CheckStatus::Unhealthy
        }
    };

    let since = Utc::now() - chrono::Duration::minutes(SUCCESS_RATE_WINDOW_MINUTES);
    let model_gateway = match state.extraction_repo.recent_success_rate(since).await {
        Ok(rate) if rate >= DEGRADED_SUCCESS_RATE => CheckStatus::Healthy,
        Ok(rate) if rate >= UNHEALTHY_SUCCESS_RATE => CheckStatus::Degraded,
        Ok(_) => CheckStatus::Unhealthy,
        Err(e) => {
            tracing::warn!("health check: could not read extraction success rate: {e}");
            CheckStatus::Degraded
        }
    };

    // Storage (object/file storage) is an external collaborator this core
    // never writes to directly; reported healthy alongside the database.
    let storage = database;

    let overall = [database, model_gateway, storage]
        .iter()
        .copied()
        .max_by_key(|s| match s {
            CheckStatus::Healthy => 0,
            CheckStatus::Degraded => 1,
            CheckStatus::Unhealthy => 2,
        })
        .unwrap_or(CheckStatus::Healthy);

    let http_status = if overall == CheckStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        http_status,
        Json(HealthResponse {
            status: overall,
            database,
            model_gateway,
            storage,
        }),
    )
}
