//! Domain error taxonomy and its HTTP mapping (spec §7).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

/// Generic API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// Domain errors, one variant per kind in the error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Missing/invalid credentials (401).
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Resource missing or not owned by the caller (404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Extraction quota exhausted for a non-elevated user (403).
    #[error("Quota exhausted: {current}/{limit}")]
    QuotaExhausted { current: i64, limit: i64 },

    /// A fresh extraction lock is already held (not a failure; 202 semantics).
    #[error("Extraction already in progress")]
    InProgress { job_id: Uuid },

    /// Missing required fields, wrong mode, non-numeric where numeric expected (400).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Available hours fall below the hard minimum (400).
    #[error("Insufficient time to schedule all topics")]
    Infeasible {
        shortfall_hours: f64,
        suggestions: Vec<String>,
    },

    /// Model gateway rate limit (429).
    #[error("Model gateway rate limited")]
    RateLimited,

    /// Model gateway credits exhausted (402).
    #[error("Model gateway credits exhausted")]
    CreditsExhausted,

    /// Unparseable JSON, schema failure, or validation failure even after repair (500).
    #[error("Invalid model output: {0}")]
    InvalidModelOutput(String),

    /// Storage write failure or unexpected exception (500).
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DomainError::AuthFailure(_) => StatusCode::UNAUTHORIZED,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::QuotaExhausted { .. } => StatusCode::FORBIDDEN,
            DomainError::InProgress { .. } => StatusCode::ACCEPTED,
            DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DomainError::Infeasible { .. } => StatusCode::BAD_REQUEST,
            DomainError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            DomainError::CreditsExhausted => StatusCode::PAYMENT_REQUIRED,
            DomainError::InvalidModelOutput(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error
                            .message
                            .as_ref()
                            .unwrap_or(&std::borrow::Cow::Borrowed("validation failed"))
                    )
                })
            })
            .collect();

        DomainError::InvalidInput(if messages.is_empty() {
            "invalid input".to_string()
        } else {
            messages.join("; ")
        })
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if matches!(
            self,
            DomainError::Internal(_) | DomainError::InvalidModelOutput(_)
        ) {
            tracing::error!("internal error: {}", self);
        }

        match &self {
            DomainError::InProgress { job_id } => (
                status,
                Json(serde_json::json!({
                    "status": "in_progress",
                    "job_id": job_id,
                })),
            )
                .into_response(),
            DomainError::QuotaExhausted { current, limit } => (
                status,
                Json(serde_json::json!({
                    "error": "quota_exhausted",
                    "current": current,
                    "limit": limit,
                })),
            )
                .into_response(),
            DomainError::Infeasible {
                shortfall_hours,
                suggestions,
            } => (
                status,
                Json(serde_json::json!({
                    "error": "insufficient_time",
                    "shortfall_hours": shortfall_hours,
                    "suggestions": suggestions,
                })),
            )
                .into_response(),
            _ => (
                status,
                Json(ErrorResponse {
                    error: self.to_string(),
                    details: None,
                }),
            )
                .into_response(),
        }
    }
}
