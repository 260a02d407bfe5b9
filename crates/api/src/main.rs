//! Study-plan scheduler server binary.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use study_scheduler_api::llm::client::HttpGenerativeModel;
use study_scheduler_api::{AppState, build_router};
use study_scheduler_config::AppConfig;
use study_scheduler_storage::{
    CourseRepository, ExtractionRepository, PlanRepository, PreferencesRepository,
    QuotaRepository, TopicRepository, UserRepository, create_pool, run_migrations,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting study-plan scheduler server...");

    let config = AppConfig::from_env()?;
    tracing::info!("Binding to {}", config.bind_address);

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let course_repo = CourseRepository::new(pool.clone());
    let topic_repo = TopicRepository::new(pool.clone());
    let extraction_repo = ExtractionRepository::new(pool.clone());
    let plan_repo = PlanRepository::new(pool.clone());
    let preferences_repo = PreferencesRepository::new(pool.clone());
    let quota_repo = QuotaRepository::new(pool.clone());
    let user_repo = UserRepository::new(pool.clone());

    let model = Arc::new(HttpGenerativeModel::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        Duration::from_secs(config.llm_timeout_seconds),
    ));

    let state = Arc::new(AppState {
        pool,
        course_repo,
        topic_repo,
        extraction_repo,
        plan_repo,
        preferences_repo,
        quota_repo,
        user_repo,
        model,
        config: config.clone(),
        start_time: Instant::now(),
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
