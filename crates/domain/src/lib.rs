//! Domain types and pure computation for the study-plan scheduler core.
//!
//! This crate has no I/O: it defines the data model shared by the storage
//! and api crates, plus the calendar, topic-graph, feasibility, scheduler
//! and validator algorithms that operate purely on in-memory values.

pub mod calendar;
pub mod errors;
pub mod feasibility;
pub mod graph;
pub mod scheduler;
pub mod validator;

pub use errors::*;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Confidence the extractor assigns to a sanitized topic record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// A topic's study lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    NotStarted,
    InProgress,
    Done,
}

/// A course's lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    Active,
    Archived,
}

/// Extraction run state machine: `running -> completed | needs_review | failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Running,
    Completed,
    NeedsReview,
    Failed,
}

/// Extraction mode: whether new topics replace or append to existing ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    #[default]
    Replace,
    Append,
}

/// A study topic, exclusively owned by one course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    /// System-assigned identifier, set on persistence. `None` before assignment.
    pub id: Option<Uuid>,
    /// AI-assigned key unique within an extraction run (e.g. `t00`).
    pub topic_key: String,
    pub course_id: Uuid,
    pub title: String,
    pub difficulty_weight: i32,
    pub exam_importance: i32,
    pub estimated_hours: f64,
    pub confidence_level: ConfidenceLevel,
    pub notes: Option<String>,
    pub source_page: Option<i32>,
    pub source_quote: Option<String>,
    /// `topic_key` values of prerequisites, pre-resolution; `id` values post-resolution.
    pub prerequisites: HashSet<String>,
    pub prerequisite_ids: HashSet<Uuid>,
    pub status: TopicStatus,
}

/// A course, exclusively owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub exam_date: NaiveDate,
    pub status: CourseStatus,
}

/// Provenance and outcome of a single extraction invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRun {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub source_file_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Short digest of the first 500 characters of the input, for deduplication.
    pub input_hash: String,
    pub status: ExtractionStatus,
    pub result: Option<ExtractionResult>,
}

/// Result payload recorded against a finished (or failed) extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub original_topic_count: usize,
    pub inserted_count: usize,
    pub truncated_due_to_quota: bool,
    pub cycles_detected: bool,
    pub needs_review: bool,
    pub questions: Vec<String>,
    pub validation_notes: Vec<String>,
}

/// A user's day-by-day study allocation, versioned per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlan {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_version: i32,
    pub days: Vec<StudyPlanDay>,
    pub validation_passed: bool,
}

/// A single calendar day within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlanDay {
    pub date: NaiveDate,
    pub total_hours: f64,
    pub is_off_day: bool,
    pub plan_version: i32,
    pub items: Vec<StudyPlanItem>,
}

/// An individual topic placement within a plan day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlanItem {
    pub topic_id: Uuid,
    pub course_id: Uuid,
    pub allocated_hours: f64,
    pub sequence_order: i32,
    pub is_review: bool,
}

/// Per-user scheduling constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSchedulePreferences {
    pub daily_capacity_hours: f64,
    pub weekly_off_days: HashSet<String>,
    pub blackout_dates: HashSet<NaiveDate>,
}

impl Default for UserSchedulePreferences {
    fn default() -> Self {
        Self {
            daily_capacity_hours: 3.0,
            weekly_off_days: HashSet::new(),
            blackout_dates: HashSet::new(),
        }
    }
}
