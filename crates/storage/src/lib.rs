//! Storage layer for the study-plan scheduler backend.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod course_repository;
pub mod error;
pub mod extraction_repository;
pub mod plan_repository;
pub mod preferences_repository;
pub mod quota_repository;
pub mod user_repository;

pub use course_repository::{CourseRepository, CourseRow, NewTopic, TopicRepository, TopicRow};
pub use error::StorageError;
pub use extraction_repository::{ExtractionRepository, ExtractionRunRow, LockOutcome};
pub use plan_repository::{
    NewPlanDay, NewPlanItem, PlanDayRow, PlanItemRow, PlanRepository, PlanRow,
};
pub use preferences_repository::{PreferencesRepository, PreferencesRow};
pub use quota_repository::QuotaRepository;
pub use user_repository::{UserRepository, UserRow};

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
