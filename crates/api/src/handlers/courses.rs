//! Course/topic CRUD beneath the extraction and scheduling pipelines
//! (§12 supplemented feature): the queryable/mutable surface a shipped
//! client needs outside of an extraction run itself.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use study_scheduler_domain::DomainError;

use crate::AppState;
use crate::middleware::auth::AuthUser;
use crate::validation::non_blank;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(custom(function = "non_blank"))]
    pub title: String,
    pub exam_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTopicRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CourseResponse {
    pub id: Uuid,
    pub title: String,
    pub exam_date: NaiveDate,
    pub status: String,
}

impl From<study_scheduler_storage::CourseRow> for CourseResponse {
    fn from(row: study_scheduler_storage::CourseRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            exam_date: row.exam_date,
            status: row.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TopicResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub topic_key: String,
    pub title: String,
    pub difficulty_weight: i32,
    pub exam_importance: i32,
    pub estimated_hours: f64,
    pub confidence_level: String,
    pub notes: Option<String>,
    pub prerequisite_ids: Vec<Uuid>,
    pub status: String,
}

impl From<study_scheduler_storage::TopicRow> for TopicResponse {
    fn from(row: study_scheduler_storage::TopicRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            topic_key: row.topic_key,
            title: row.title,
            difficulty_weight: row.difficulty_weight,
            exam_importance: row.exam_importance,
            estimated_hours: row.estimated_hours,
            confidence_level: row.confidence_level,
            notes: row.notes,
            prerequisite_ids: row.prerequisite_ids,
            status: row.status,
        }
    }
}

pub async fn create_course(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let course = state
        .course_repo
        .create(user_id, req.title.trim(), req.exam_date)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(CourseResponse::from(course)))
}

pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, DomainError> {
    let courses = state
        .course_repo
        .list_for_user(user_id, false)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(
        courses.into_iter().map(CourseResponse::from).collect::<Vec<_>>(),
    ))
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, DomainError> {
    let course = owned_course(&state, user_id, course_id).await?;
    let topics = state
        .topic_repo
        .list_for_course(course_id)
        .await
        .map_err(anyhow::Error::from)?;

    Ok(Json(serde_json::json!({
        "course": CourseResponse::from(course),
        "topics": topics.into_iter().map(TopicResponse::from).collect::<Vec<_>>(),
    })))
}

pub async fn archive_course(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, DomainError> {
    owned_course(&state, user_id, course_id).await?;
    state
        .course_repo
        .update_status(course_id, "archived")
        .await
        .map_err(anyhow::Error::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, DomainError> {
    owned_course(&state, user_id, course_id).await?;
    state
        .course_repo
        .delete(course_id)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn update_topic(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path((course_id, topic_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateTopicRequest>,
) -> Result<impl IntoResponse, DomainError> {
    owned_course(&state, user_id, course_id).await?;

    let exists = state
        .topic_repo
        .list_for_course(course_id)
        .await
        .map_err(anyhow::Error::from)?
        .iter()
        .any(|t| t.id == topic_id);
    if !exists {
        return Err(DomainError::NotFound("topic not found".to_string()));
    }

    if let Some(status) = &req.status {
        if !matches!(status.as_str(), "not_started" | "in_progress" | "done") {
            return Err(DomainError::InvalidInput(format!("invalid topic status: {status}")));
        }
        state
            .topic_repo
            .update_status(topic_id, status)
            .await
            .map_err(anyhow::Error::from)?;
    }

    if req.title.is_some() || req.notes.is_some() {
        state
            .topic_repo
            .update_fields(topic_id, req.title.as_deref(), req.notes.as_deref())
            .await
            .map_err(anyhow::Error::from)?;
    }

    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn owned_course(
    state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<study_scheduler_storage::CourseRow, DomainError> {
    let course = state
        .course_repo
        .get(course_id)
        .await
        .map_err(anyhow::Error::from)?
        .ok_or_else(|| DomainError::NotFound("course not found".to_string()))?;
    if course.owner_id != user_id {
        return Err(DomainError::NotFound("course not found".to_string()));
    }
    Ok(course)
}
