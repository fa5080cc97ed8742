use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "submission_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Submitted,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    NotSubmitted,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
}

impl ProjectStatus {
    pub fn is_reviewable(self) -> bool {
        matches!(self, ProjectStatus::Submitted | ProjectStatus::UnderReview)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    pub id: Uuid,
    pub student_id: Uuid,
    pub task_id: Uuid,
    pub answer_text: Option<String>,
    pub file_url: Option<String>,
    pub status: SubmissionStatus,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTaskSubmission {
    pub student_id: Uuid,
    pub task_id: Uuid,
    pub answer_text: Option<String>,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSubmission {
    pub id: Uuid,
    pub student_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub github_repo: Option<String>,
    pub status: ProjectStatus,
    pub feedback: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProjectSubmission {
    pub student_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub github_repo: Option<String>,
}

/// Admin decision on a task submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskReviewAction {
    Accept,
    Reject,
}

impl FromStr for TaskReviewAction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(TaskReviewAction::Accept),
            "reject" => Ok(TaskReviewAction::Reject),
            _ => Err(ApiError::bad_request("Action must be 'accept' or 'reject'")),
        }
    }
}

/// Admin decision on a project submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectReviewAction {
    Approve,
    Reject,
}

impl FromStr for ProjectReviewAction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ProjectReviewAction::Approve),
            "reject" => Ok(ProjectReviewAction::Reject),
            _ => Err(ApiError::bad_request("Action must be 'approve' or 'reject'")),
        }
    }
}

/// File part of a multipart submission, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Set when the part exceeded the read ceiling; `bytes` is then truncated.
    pub oversized: bool,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Fields of the multipart task submission form, still as raw text.
#[derive(Debug, Default)]
pub struct TaskSubmissionForm {
    pub task_id: Option<String>,
    pub student_task_id: Option<String>,
    pub answer_text: Option<String>,
    pub submission_id: Option<String>,
    pub file: Option<UploadedFile>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[validate(length(min = 1, message = "Submission ID and action are required"))]
    pub submission_id: String,
    #[validate(length(min = 1, message = "Submission ID and action are required"))]
    pub action: String,
    #[validate(length(max = 2000, message = "Feedback must be at most 2000 characters"))]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
    #[validate(length(max = 500, message = "Repository link must be at most 500 characters"))]
    pub github_repo: Option<String>,
    #[validate(length(max = 500, message = "File URL must be at most 500 characters"))]
    pub file_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}
