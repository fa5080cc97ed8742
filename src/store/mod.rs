//! Persistence gateway. Every component reads and writes through [`Store`].
//!
//! Uniqueness rules (one submission per student and task, one
//! assignment per student and task, one attendance row per day, unique
//! email) are enforced by the implementation and reported as
//! [`StoreError::Conflict`]; callers turn that into a friendly 400.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::attendance::models::{Attendance, AttendanceStatus};
use crate::auth::models::{Identity, NewUser, Role, User, UserCredentials, UserSummary};
use crate::contact::models::{ContactLead, NewLead};
use crate::messages::models::Message;
use crate::notifications::models::Notification;
use crate::progress::models::{ProgressUpdate, StudentProfile};
use crate::submissions::models::{
    NewProjectSubmission, NewTaskSubmission, ProjectStatus, ProjectSubmission, SubmissionStatus,
    TaskSubmission,
};
use crate::tasks::models::{AssignedTask, NewTask, StudentTask, Task};

pub use memory::{InsertFailure, MemoryStore};
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StudentCounts {
    pub total: i64,
    pub active: i64,
    pub new_since: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // users and sessions
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>>;
    async fn promote_to_admin(&self, email: &str) -> Result<Option<User>>;
    async fn set_avatar_url(&self, user_id: Uuid, url: &str) -> Result<()>;
    async fn update_phone(&self, user_id: Uuid, phone: Option<String>) -> Result<()>;
    async fn list_users_by_role(&self, role: Role) -> Result<Vec<UserSummary>>;
    async fn create_session(&self, token: &str, user_id: Uuid, expires_at: DateTime<Utc>)
        -> Result<()>;
    /// Resolves a live session straight to the caller's identity.
    async fn resolve_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Identity>>;
    async fn delete_session(&self, token: &str) -> Result<()>;

    // student profiles
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<StudentProfile>>;
    async fn upsert_progress(&self, user_id: Uuid, update: ProgressUpdate)
        -> Result<StudentProfile>;
    async fn set_program_track(&self, user_id: Uuid, track: Option<String>)
        -> Result<StudentProfile>;

    // tasks
    async fn create_task(&self, task: NewTask) -> Result<Task>;
    async fn find_task(&self, id: Uuid) -> Result<Option<Task>>;
    async fn assign_task(&self, task_id: Uuid, user_id: Uuid) -> Result<StudentTask>;
    async fn find_student_task(&self, id: Uuid) -> Result<Option<StudentTask>>;
    async fn list_assigned_tasks(&self, user_id: Uuid) -> Result<Vec<AssignedTask>>;

    // task submissions
    async fn find_task_submission(&self, id: Uuid) -> Result<Option<TaskSubmission>>;
    async fn find_task_submission_for(
        &self,
        student_id: Uuid,
        task_id: Uuid,
    ) -> Result<Option<TaskSubmission>>;
    async fn insert_task_submission(&self, submission: NewTaskSubmission)
        -> Result<TaskSubmission>;
    /// Replaces content of a REJECTED submission and reopens it. `None` when
    /// the row is no longer REJECTED.
    async fn resubmit_task_submission(
        &self,
        id: Uuid,
        answer_text: Option<String>,
        file_url: Option<String>,
    ) -> Result<Option<TaskSubmission>>;
    /// Applies a review to a SUBMITTED submission. `None` when the row is no
    /// longer SUBMITTED.
    async fn review_task_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        feedback: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<TaskSubmission>>;
    async fn list_task_submissions(&self, status: SubmissionStatus)
        -> Result<Vec<TaskSubmission>>;

    // project submissions
    async fn latest_project_submission(&self, student_id: Uuid)
        -> Result<Option<ProjectSubmission>>;
    async fn find_project_submission(&self, id: Uuid) -> Result<Option<ProjectSubmission>>;
    async fn insert_project_submission(
        &self,
        submission: NewProjectSubmission,
    ) -> Result<ProjectSubmission>;
    /// Fills in a NOT_SUBMITTED placeholder. `None` when it is no longer one.
    async fn submit_project_placeholder(
        &self,
        id: Uuid,
        submission: NewProjectSubmission,
    ) -> Result<Option<ProjectSubmission>>;
    /// Applies a review to a SUBMITTED or UNDER_REVIEW project. `None` when
    /// it is in neither state.
    async fn review_project_submission(
        &self,
        id: Uuid,
        status: ProjectStatus,
        feedback: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<ProjectSubmission>>;
    async fn list_project_submissions(&self, status: ProjectStatus)
        -> Result<Vec<ProjectSubmission>>;

    // attendance
    async fn mark_attendance(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<Attendance>;
    async fn list_attendance(&self, user_id: Uuid) -> Result<Vec<Attendance>>;

    // notifications
    async fn create_notification(&self, user_id: Uuid, title: &str, message: &str)
        -> Result<Notification>;
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>>;
    async fn count_unread(&self, user_id: Uuid) -> Result<i64>;
    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>>;
    async fn mark_notification_read(&self, id: Uuid) -> Result<()>;
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64>;

    // messages
    async fn create_message(&self, sender_id: Uuid, receiver_id: Uuid, content: &str)
        -> Result<Message>;
    async fn conversation(&self, a: Uuid, b: Uuid, limit: i64) -> Result<Vec<Message>>;

    // contact leads and analytics
    async fn create_lead(&self, lead: NewLead) -> Result<ContactLead>;
    async fn count_leads(&self) -> Result<i64>;
    async fn student_counts(&self, since: DateTime<Utc>) -> Result<StudentCounts>;
}
