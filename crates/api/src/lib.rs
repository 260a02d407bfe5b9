//! Study-plan scheduler API server library.

pub mod handlers;
pub mod llm;
pub mod middleware;
pub mod validation;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use study_scheduler_config::AppConfig;
use study_scheduler_storage::{
    CourseRepository, ExtractionRepository, PlanRepository, PreferencesRepository,
    QuotaRepository, TopicRepository, UserRepository,
};

use llm::GenerativeModel;

/// Application state shared across handlers.
pub struct AppState {
    pub pool: PgPool,
    pub course_repo: CourseRepository,
    pub topic_repo: TopicRepository,
    pub extraction_repo: ExtractionRepository,
    pub plan_repo: PlanRepository,
    pub preferences_repo: PreferencesRepository,
    pub quota_repo: QuotaRepository,
    pub user_repo: UserRepository,
    pub model: Arc<dyn GenerativeModel>,
    pub config: AppConfig,
    pub start_time: Instant,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health::health))
        .route("/v1/courses", post(handlers::courses::create_course))
        .route("/v1/courses", get(handlers::courses::list_courses))
        .route("/v1/courses/{id}", get(handlers::courses::get_course))
        .route("/v1/courses/{id}", delete(handlers::courses::delete_course))
        .route(
            "/v1/courses/{id}/archive",
            post(handlers::courses::archive_course),
        )
        .route(
            "/v1/courses/{id}/extract",
            post(handlers::extract::extract),
        )
        .route(
            "/v1/courses/{id}/topics/{topic_id}",
            patch(handlers::courses::update_topic),
        )
        .route("/v1/plan", post(handlers::plan::generate_plan))
        .route(
            "/v1/preferences",
            get(handlers::preferences::get_preferences),
        )
        .route(
            "/v1/preferences",
            patch(handlers::preferences::update_preferences),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
