use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::submissions::models::SubmissionStatus;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub week: Option<i32>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub week: Option<i32>,
    pub due_date: Option<NaiveDate>,
}

/// Assignment of one task to one student. Its existence is what allows the
/// student to submit.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentTask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub assigned_at: DateTime<Utc>,
}

/// A student's view of one assignment.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AssignedTask {
    pub student_task_id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub description: String,
    pub week: Option<i32>,
    pub due_date: Option<NaiveDate>,
    pub assigned_at: DateTime<Utc>,
    pub submission_id: Option<Uuid>,
    pub submission_status: Option<SubmissionStatus>,
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Description must be 1-5000 characters"
    ))]
    pub description: String,
    #[validate(range(min = 1, max = 52, message = "Week must be between 1 and 52"))]
    pub week: Option<i32>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignTaskRequest {
    #[validate(length(min = 1, message = "Task ID is required"))]
    pub task_id: String,
    #[validate(length(min = 1, message = "User ID is required"))]
    pub user_id: String,
}
