#![cfg(feature = "postgres-tests")]

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use study_scheduler_api::llm::{GenerativeModel, ModelCompletion, ModelError};
use study_scheduler_api::middleware::auth::Claims;
use study_scheduler_api::{AppState, build_router};
use study_scheduler_config::AppConfig;
use study_scheduler_storage::{
    CourseRepository, ExtractionRepository, PlanRepository, PreferencesRepository,
    QuotaRepository, TopicRepository, UserRepository,
};

struct FakeModel;

#[async_trait]
impl GenerativeModel for FakeModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_payload: &str,
    ) -> Result<ModelCompletion, ModelError> {
        Err(ModelError::Unavailable("fake model: no test uses a live call".to_string()))
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        jwt_secret: "test-secret".to_string(),
        bind_address: "127.0.0.1:0".to_string(),
        llm_base_url: "http://unused".to_string(),
        llm_api_key: "".to_string(),
        llm_model: "test-model".to_string(),
        llm_timeout_seconds: 30,
        daily_topic_quota: 500,
        extraction_stale_seconds: 300,
    }
}

fn test_state(pool: PgPool) -> Arc<AppState> {
    Arc::new(AppState {
        course_repo: CourseRepository::new(pool.clone()),
        topic_repo: TopicRepository::new(pool.clone()),
        extraction_repo: ExtractionRepository::new(pool.clone()),
        plan_repo: PlanRepository::new(pool.clone()),
        preferences_repo: PreferencesRepository::new(pool.clone()),
        quota_repo: QuotaRepository::new(pool.clone()),
        user_repo: UserRepository::new(pool.clone()),
        model: Arc::new(FakeModel),
        config: test_config(),
        pool,
        start_time: Instant::now(),
    })
}

fn auth_header(user_id: Uuid) -> String {
    let now = Utc::now().timestamp() as u64;
    let token = encode(
        &Header::default(),
        &Claims { sub: user_id.to_string(), exp: now + 3600, iat: now },
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();
    format!("Bearer {token}")
}

#[sqlx::test(migrations = "../../migrations")]
async fn healthz_reports_healthy_with_no_prior_runs(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool));

    let resp = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty())?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&to_bytes(resp.into_body(), 1024 * 1024).await?)?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "healthy");
    assert_eq!(body["model_gateway"], "healthy");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn course_crud_roundtrip_is_owner_scoped(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool));
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let create_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/courses")
                .header(header::AUTHORIZATION, auth_header(owner))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json!({
                    "title": "Organic Chemistry",
                    "exam_date": (Utc::now().date_naive() + ChronoDuration::days(30)).to_string(),
                }))?))?,
        )
        .await?;
    assert_eq!(create_resp.status(), StatusCode::OK);
    let created: Value =
        serde_json::from_slice(&to_bytes(create_resp.into_body(), 1024 * 1024).await?)?;
    let course_id = created["id"].as_str().unwrap().to_string();

    let get_as_owner = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/courses/{course_id}"))
                .header(header::AUTHORIZATION, auth_header(owner))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(get_as_owner.status(), StatusCode::OK);

    let get_as_stranger = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/courses/{course_id}"))
                .header(header::AUTHORIZATION, auth_header(stranger))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(get_as_stranger.status(), StatusCode::NOT_FOUND);

    let unauthenticated = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/courses/{course_id}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let delete_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/v1/courses/{course_id}"))
                .header(header::AUTHORIZATION, auth_header(owner))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(delete_resp.status(), StatusCode::NO_CONTENT);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn create_course_rejects_blank_title(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool));

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/courses")
                .header(header::AUTHORIZATION, auth_header(Uuid::new_v4()))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json!({
                    "title": "   ",
                    "exam_date": "2026-12-01",
                }))?))?,
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn preferences_roundtrip_persists_and_validates(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool));
    let user = Uuid::new_v4();

    let defaults = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/preferences")
                .header(header::AUTHORIZATION, auth_header(user))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(defaults.status(), StatusCode::OK);
    let defaults_body: Value =
        serde_json::from_slice(&to_bytes(defaults.into_body(), 1024 * 1024).await?)?;
    assert_eq!(defaults_body["daily_capacity_hours"], 3.0);

    let update = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/v1/preferences")
                .header(header::AUTHORIZATION, auth_header(user))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json!({
                    "daily_capacity_hours": 4.5,
                    "weekly_off_days": ["sunday"],
                    "blackout_dates": ["2026-12-25"],
                }))?))?,
        )
        .await?;
    assert_eq!(update.status(), StatusCode::OK);

    let fetched = app
        .oneshot(
            Request::builder()
                .uri("/v1/preferences")
                .header(header::AUTHORIZATION, auth_header(user))
                .body(Body::empty())?,
        )
        .await?;
    let fetched_body: Value =
        serde_json::from_slice(&to_bytes(fetched.into_body(), 1024 * 1024).await?)?;
    assert_eq!(fetched_body["daily_capacity_hours"], 4.5);
    assert_eq!(fetched_body["weekly_off_days"], json!(["sunday"]));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_preferences_rejects_invalid_weekday(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool));

    let resp = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/v1/preferences")
                .header(header::AUTHORIZATION, auth_header(Uuid::new_v4()))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json!({
                    "daily_capacity_hours": 3.0,
                    "weekly_off_days": ["funday"],
                    "blackout_dates": [],
                }))?))?,
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn generate_plan_with_no_active_courses_is_rejected(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(test_state(pool));
    let user = Uuid::new_v4();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/plan")
                .header(header::AUTHORIZATION, auth_header(user))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json!({
                    "reschedule": false,
                    "include_missed_items": false,
                }))?))?,
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}
