use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Result, Store, StoreError, StudentCounts};
use crate::attendance::models::{Attendance, AttendanceStatus};
use crate::auth::models::{Identity, NewUser, Role, User, UserCredentials, UserSummary};
use crate::contact::models::{ContactLead, NewLead};
use crate::messages::models::Message;
use crate::notifications::models::Notification;
use crate::progress::models::{ProgressUpdate, StudentProfile, StudentStatus};
use crate::submissions::models::{
    NewProjectSubmission, NewTaskSubmission, ProjectStatus, ProjectSubmission, SubmissionStatus,
    TaskSubmission,
};
use crate::tasks::models::{AssignedTask, NewTask, StudentTask, Task};

const USER_COLUMNS: &str = "id, name, email, phone, avatar_url, role, created_at, updated_at";

const TASK_SUBMISSION_COLUMNS: &str =
    "id, student_id, task_id, answer_text, file_url, status, feedback, created_at, updated_at, reviewed_at";

const PROJECT_COLUMNS: &str = "id, student_id, title, description, file_url, github_repo, status, \
     feedback, submitted_at, reviewed_at, created_at";

const PROFILE_COLUMNS: &str =
    "user_id, program_track, progress_week, progress_percent, status, updated_at";

/// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

fn conflict_or_db(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let constraint = db_err.constraint().unwrap_or("unique").to_string();
            return StoreError::Conflict(constraint);
        }
    }
    StoreError::Database(e)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, phone, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(Role::Student)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or_db)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>> {
        let creds = sqlx::query_as::<_, UserCredentials>(
            "SELECT id, email, password_hash, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(creds)
    }

    async fn promote_to_admin(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET role = $1, updated_at = NOW()
            WHERE email = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Role::Admin)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_avatar_url(&self, user_id: Uuid, url: &str) -> Result<()> {
        sqlx::query("UPDATE users SET avatar_url = $1, updated_at = NOW() WHERE id = $2")
            .bind(url)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_phone(&self, user_id: Uuid, phone: Option<String>) -> Result<()> {
        sqlx::query("UPDATE users SET phone = $1, updated_at = NOW() WHERE id = $2")
            .bind(phone)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, email FROM users WHERE role = $1 ORDER BY name",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(conflict_or_db)?;
        Ok(())
    }

    async fn resolve_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            SELECT u.id AS user_id, u.email, u.role
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = $1 AND s.expires_at > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(identity)
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<StudentProfile>> {
        let profile = sqlx::query_as::<_, StudentProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM student_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn upsert_progress(
        &self,
        user_id: Uuid,
        update: ProgressUpdate,
    ) -> Result<StudentProfile> {
        let profile = sqlx::query_as::<_, StudentProfile>(&format!(
            r#"
            INSERT INTO student_profiles (user_id, progress_week, progress_percent, status)
            VALUES ($1, COALESCE($2, 1), COALESCE($3, 0), COALESCE($4, $5))
            ON CONFLICT (user_id) DO UPDATE SET
                progress_week = COALESCE($2, student_profiles.progress_week),
                progress_percent = COALESCE($3, student_profiles.progress_percent),
                status = COALESCE($4, student_profiles.status),
                updated_at = NOW()
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(update.progress_week)
        .bind(update.progress_percent)
        .bind(update.status)
        .bind(StudentStatus::Active)
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn set_program_track(
        &self,
        user_id: Uuid,
        track: Option<String>,
    ) -> Result<StudentProfile> {
        let profile = sqlx::query_as::<_, StudentProfile>(&format!(
            r#"
            INSERT INTO student_profiles (user_id, program_track)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                program_track = EXCLUDED.program_track,
                updated_at = NOW()
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(track)
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, title, description, week, due_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, description, week, due_date, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.week)
        .bind(task.due_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            "SELECT id, title, description, week, due_date, created_at FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn assign_task(&self, task_id: Uuid, user_id: Uuid) -> Result<StudentTask> {
        sqlx::query_as::<_, StudentTask>(
            r#"
            INSERT INTO student_tasks (id, task_id, user_id)
            VALUES ($1, $2, $3)
            RETURNING id, task_id, user_id, assigned_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or_db)
    }

    async fn find_student_task(&self, id: Uuid) -> Result<Option<StudentTask>> {
        let row = sqlx::query_as::<_, StudentTask>(
            "SELECT id, task_id, user_id, assigned_at FROM student_tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_assigned_tasks(&self, user_id: Uuid) -> Result<Vec<AssignedTask>> {
        let rows = sqlx::query_as::<_, AssignedTask>(
            r#"
            SELECT st.id AS student_task_id, t.id AS task_id, t.title, t.description,
                   t.week, t.due_date, st.assigned_at,
                   ts.id AS submission_id, ts.status AS submission_status, ts.feedback
            FROM student_tasks st
            JOIN tasks t ON t.id = st.task_id
            LEFT JOIN task_submissions ts
                   ON ts.task_id = st.task_id AND ts.student_id = st.user_id
            WHERE st.user_id = $1
            ORDER BY t.week NULLS LAST, st.assigned_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_task_submission(&self, id: Uuid) -> Result<Option<TaskSubmission>> {
        let row = sqlx::query_as::<_, TaskSubmission>(&format!(
            "SELECT {TASK_SUBMISSION_COLUMNS} FROM task_submissions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_task_submission_for(
        &self,
        student_id: Uuid,
        task_id: Uuid,
    ) -> Result<Option<TaskSubmission>> {
        let row = sqlx::query_as::<_, TaskSubmission>(&format!(
            "SELECT {TASK_SUBMISSION_COLUMNS} FROM task_submissions WHERE student_id = $1 AND task_id = $2"
        ))
        .bind(student_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_task_submission(
        &self,
        submission: NewTaskSubmission,
    ) -> Result<TaskSubmission> {
        sqlx::query_as::<_, TaskSubmission>(&format!(
            r#"
            INSERT INTO task_submissions (id, student_id, task_id, answer_text, file_url, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TASK_SUBMISSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(submission.student_id)
        .bind(submission.task_id)
        .bind(&submission.answer_text)
        .bind(&submission.file_url)
        .bind(SubmissionStatus::Submitted)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or_db)
    }

    async fn resubmit_task_submission(
        &self,
        id: Uuid,
        answer_text: Option<String>,
        file_url: Option<String>,
    ) -> Result<Option<TaskSubmission>> {
        let row = sqlx::query_as::<_, TaskSubmission>(&format!(
            r#"
            UPDATE task_submissions
            SET answer_text = $2,
                file_url = COALESCE($3, file_url),
                status = $4,
                feedback = NULL,
                reviewed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = $5
            RETURNING {TASK_SUBMISSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(answer_text)
        .bind(file_url)
        .bind(SubmissionStatus::Submitted)
        .bind(SubmissionStatus::Rejected)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn review_task_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        feedback: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<TaskSubmission>> {
        let row = sqlx::query_as::<_, TaskSubmission>(&format!(
            r#"
            UPDATE task_submissions
            SET status = $2, feedback = $3, reviewed_at = $4, updated_at = $4
            WHERE id = $1 AND status = $5
            RETURNING {TASK_SUBMISSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(feedback)
        .bind(reviewed_at)
        .bind(SubmissionStatus::Submitted)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_task_submissions(
        &self,
        status: SubmissionStatus,
    ) -> Result<Vec<TaskSubmission>> {
        let rows = sqlx::query_as::<_, TaskSubmission>(&format!(
            "SELECT {TASK_SUBMISSION_COLUMNS} FROM task_submissions WHERE status = $1 ORDER BY updated_at"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn latest_project_submission(
        &self,
        student_id: Uuid,
    ) -> Result<Option<ProjectSubmission>> {
        let row = sqlx::query_as::<_, ProjectSubmission>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM project_submissions WHERE student_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_project_submission(&self, id: Uuid) -> Result<Option<ProjectSubmission>> {
        let row = sqlx::query_as::<_, ProjectSubmission>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM project_submissions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_project_submission(
        &self,
        submission: NewProjectSubmission,
    ) -> Result<ProjectSubmission> {
        sqlx::query_as::<_, ProjectSubmission>(&format!(
            r#"
            INSERT INTO project_submissions
                (id, student_id, title, description, file_url, github_repo, status, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(submission.student_id)
        .bind(&submission.title)
        .bind(&submission.description)
        .bind(&submission.file_url)
        .bind(&submission.github_repo)
        .bind(ProjectStatus::Submitted)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or_db)
    }

    async fn submit_project_placeholder(
        &self,
        id: Uuid,
        submission: NewProjectSubmission,
    ) -> Result<Option<ProjectSubmission>> {
        let row = sqlx::query_as::<_, ProjectSubmission>(&format!(
            r#"
            UPDATE project_submissions
            SET title = $2, description = $3, file_url = $4, github_repo = $5,
                status = $6, submitted_at = NOW()
            WHERE id = $1 AND status = $7
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&submission.title)
        .bind(&submission.description)
        .bind(&submission.file_url)
        .bind(&submission.github_repo)
        .bind(ProjectStatus::Submitted)
        .bind(ProjectStatus::NotSubmitted)
        .fetch_optional(&self.pool)
        .await
        .map_err(conflict_or_db)?;
        Ok(row)
    }

    async fn review_project_submission(
        &self,
        id: Uuid,
        status: ProjectStatus,
        feedback: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<ProjectSubmission>> {
        let row = sqlx::query_as::<_, ProjectSubmission>(&format!(
            r#"
            UPDATE project_submissions
            SET status = $2, feedback = $3, reviewed_at = $4
            WHERE id = $1 AND status IN ($5, $6)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(feedback)
        .bind(reviewed_at)
        .bind(ProjectStatus::Submitted)
        .bind(ProjectStatus::UnderReview)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_project_submissions(
        &self,
        status: ProjectStatus,
    ) -> Result<Vec<ProjectSubmission>> {
        let rows = sqlx::query_as::<_, ProjectSubmission>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM project_submissions WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_attendance(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<Attendance> {
        let row = sqlx::query_as::<_, Attendance>(
            r#"
            INSERT INTO attendance (id, user_id, date, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, date) DO UPDATE SET status = EXCLUDED.status
            RETURNING id, user_id, date, status
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(date)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_attendance(&self, user_id: Uuid) -> Result<Vec<Attendance>> {
        let rows = sqlx::query_as::<_, Attendance>(
            "SELECT id, user_id, date, status FROM attendance WHERE user_id = $1 ORDER BY date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_notification(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
    ) -> Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, user_id, title, message, is_read)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING id, user_id, title, message, is_read, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, title, message, is_read, created_at
            FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, title, message, is_read, created_at FROM notifications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        let row = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sender_id, receiver_id, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn conversation(&self, a: Uuid, b: Uuid, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, sender_id, receiver_id, content, created_at FROM (
                SELECT id, sender_id, receiver_id, content, created_at
                FROM messages
                WHERE (sender_id = $1 AND receiver_id = $2)
                   OR (sender_id = $2 AND receiver_id = $1)
                ORDER BY created_at DESC
                LIMIT $3
            ) recent
            ORDER BY created_at
            "#,
        )
        .bind(a)
        .bind(b)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_lead(&self, lead: NewLead) -> Result<ContactLead> {
        let row = sqlx::query_as::<_, ContactLead>(
            r#"
            INSERT INTO contact_leads (id, name, email, phone, message, kind)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, email, phone, message, kind, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.message)
        .bind(&lead.kind)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_leads(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM contact_leads")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn student_counts(&self, since: DateTime<Utc>) -> Result<StudentCounts> {
        let (total, active, new_since) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE sp.status = $2),
                COUNT(*) FILTER (WHERE u.created_at >= $3)
            FROM users u
            LEFT JOIN student_profiles sp ON sp.user_id = u.id
            WHERE u.role = $1
            "#,
        )
        .bind(Role::Student)
        .bind(StudentStatus::Active)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(StudentCounts {
            total,
            active,
            new_since,
        })
    }
}
