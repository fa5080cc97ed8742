use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "student_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub user_id: Uuid,
    pub program_track: Option<String>,
    pub progress_week: i32,
    pub progress_percent: i32,
    pub status: StudentStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub progress_week: i32,
    pub progress_percent: i32,
    pub status: StudentStatus,
    pub program_track: Option<String>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            progress_week: 1,
            progress_percent: 0,
            status: StudentStatus::Active,
            program_track: None,
        }
    }
}

impl From<StudentProfile> for Progress {
    fn from(profile: StudentProfile) -> Self {
        Self {
            progress_week: profile.progress_week,
            progress_percent: profile.progress_percent,
            status: profile.status,
            program_track: profile.program_track,
        }
    }
}

/// Partial update; absent fields keep their stored (or default) value.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub progress_week: Option<i32>,
    pub progress_percent: Option<i32>,
    pub status: Option<StudentStatus>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressRequest {
    pub user_id: Option<String>,
    #[validate(range(min = 1, max = 16, message = "Progress week must be between 1 and 16"))]
    pub progress_week: Option<i32>,
    #[validate(range(min = 0, max = 100, message = "Progress percent must be between 0 and 100"))]
    pub progress_percent: Option<i32>,
    pub status: Option<StudentStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "Program track must be at most 100 characters"))]
    pub program_track: Option<String>,
}
