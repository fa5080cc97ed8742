use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
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

struct StoredUser {
    user: User,
    password_hash: String,
}

struct StoredSession {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: Vec<StoredUser>,
    sessions: HashMap<String, StoredSession>,
    profiles: HashMap<Uuid, StudentProfile>,
    tasks: Vec<Task>,
    student_tasks: Vec<StudentTask>,
    task_submissions: Vec<TaskSubmission>,
    projects: Vec<ProjectSubmission>,
    attendance: Vec<Attendance>,
    notifications: Vec<Notification>,
    messages: Vec<Message>,
    leads: Vec<ContactLead>,
    pending_insert_failure: Option<InsertFailure>,
}

/// Outcome forced onto the next task submission insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFailure {
    /// A concurrent writer won the unique (student, task) slot.
    Conflict,
    /// The database could not be reached.
    Unavailable,
}

impl Inner {
    fn user(&self, id: Uuid) -> Option<&StoredUser> {
        self.users.iter().find(|u| u.user.id == id)
    }

    fn user_mut(&mut self, id: Uuid) -> Option<&mut StoredUser> {
        self.users.iter_mut().find(|u| u.user.id == id)
    }

    fn has_live_project(&self, student_id: Uuid) -> bool {
        self.projects
            .iter()
            .any(|p| p.student_id == student_id && p.status != ProjectStatus::NotSubmitted)
    }

    fn default_profile(user_id: Uuid) -> StudentProfile {
        StudentProfile {
            user_id,
            program_track: None,
            progress_week: 1,
            progress_percent: 0,
            status: StudentStatus::Active,
            updated_at: Utc::now(),
        }
    }
}

/// Process-local [`Store`] with the same uniqueness and conditional-update
/// rules as the Postgres schema. One lock guards everything, so every
/// operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user directly, bypassing registration. Handy for fixtures.
    pub fn insert_user(&self, name: &str, email: &str, password_hash: &str, role: Role) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            avatar_url: None,
            role,
            created_at: now,
            updated_at: now,
        };
        self.write().users.push(StoredUser {
            user: user.clone(),
            password_hash: password_hash.to_string(),
        });
        user
    }

    /// Makes the next `insert_task_submission` fail without writing.
    pub fn fail_next_insert(&self, failure: InsertFailure) {
        self.write().pending_insert_failure = Some(failure);
    }

    /// Creates a NOT_SUBMITTED project row, as an admin would when opening
    /// the final project for a student.
    pub fn insert_project_placeholder(&self, student_id: Uuid, title: &str) -> ProjectSubmission {
        let project = ProjectSubmission {
            id: Uuid::new_v4(),
            student_id,
            title: title.to_string(),
            description: None,
            file_url: None,
            github_repo: None,
            status: ProjectStatus::NotSubmitted,
            feedback: None,
            submitted_at: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };
        self.write().projects.push(project.clone());
        project
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut inner = self.write();
        if inner.users.iter().any(|u| u.user.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".into()));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            avatar_url: None,
            role: Role::Student,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(StoredUser {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        Ok(created)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.read().user(id).map(|u| u.user.clone()))
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>> {
        let inner = self.read();
        Ok(inner
            .users
            .iter()
            .find(|u| u.user.email == email)
            .map(|u| UserCredentials {
                id: u.user.id,
                email: u.user.email.clone(),
                password_hash: u.password_hash.clone(),
                role: u.user.role,
            }))
    }

    async fn promote_to_admin(&self, email: &str) -> Result<Option<User>> {
        let mut inner = self.write();
        Ok(inner
            .users
            .iter_mut()
            .find(|u| u.user.email == email)
            .map(|u| {
                u.user.role = Role::Admin;
                u.user.updated_at = Utc::now();
                u.user.clone()
            }))
    }

    async fn set_avatar_url(&self, user_id: Uuid, url: &str) -> Result<()> {
        if let Some(stored) = self.write().user_mut(user_id) {
            stored.user.avatar_url = Some(url.to_string());
            stored.user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_phone(&self, user_id: Uuid, phone: Option<String>) -> Result<()> {
        if let Some(stored) = self.write().user_mut(user_id) {
            stored.user.phone = phone;
            stored.user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<UserSummary>> {
        let mut users: Vec<UserSummary> = self
            .read()
            .users
            .iter()
            .filter(|u| u.user.role == role)
            .map(|u| UserSummary {
                id: u.user.id,
                name: u.user.name.clone(),
                email: u.user.email.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn create_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.write();
        if inner.sessions.contains_key(token) {
            return Err(StoreError::Conflict("sessions_pkey".into()));
        }
        inner.sessions.insert(
            token.to_string(),
            StoredSession {
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn resolve_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Identity>> {
        let inner = self.read();
        let Some(session) = inner.sessions.get(token) else {
            return Ok(None);
        };
        if session.expires_at <= now {
            return Ok(None);
        }
        Ok(inner.user(session.user_id).map(|u| Identity {
            user_id: u.user.id,
            email: u.user.email.clone(),
            role: u.user.role,
        }))
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        self.write().sessions.remove(token);
        Ok(())
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<StudentProfile>> {
        Ok(self.read().profiles.get(&user_id).cloned())
    }

    async fn upsert_progress(
        &self,
        user_id: Uuid,
        update: ProgressUpdate,
    ) -> Result<StudentProfile> {
        let mut inner = self.write();
        let profile = inner
            .profiles
            .entry(user_id)
            .or_insert_with(|| Inner::default_profile(user_id));
        if let Some(week) = update.progress_week {
            profile.progress_week = week;
        }
        if let Some(percent) = update.progress_percent {
            profile.progress_percent = percent;
        }
        if let Some(status) = update.status {
            profile.status = status;
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn set_program_track(
        &self,
        user_id: Uuid,
        track: Option<String>,
    ) -> Result<StudentProfile> {
        let mut inner = self.write();
        let profile = inner
            .profiles
            .entry(user_id)
            .or_insert_with(|| Inner::default_profile(user_id));
        profile.program_track = track;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        let created = Task {
            id: Uuid::new_v4(),
            title: task.title,
            description: task.description,
            week: task.week,
            due_date: task.due_date,
            created_at: Utc::now(),
        };
        self.write().tasks.push(created.clone());
        Ok(created)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.read().tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn assign_task(&self, task_id: Uuid, user_id: Uuid) -> Result<StudentTask> {
        let mut inner = self.write();
        if inner
            .student_tasks
            .iter()
            .any(|st| st.task_id == task_id && st.user_id == user_id)
        {
            return Err(StoreError::Conflict("student_tasks_task_user_key".into()));
        }
        let assignment = StudentTask {
            id: Uuid::new_v4(),
            task_id,
            user_id,
            assigned_at: Utc::now(),
        };
        inner.student_tasks.push(assignment.clone());
        Ok(assignment)
    }

    async fn find_student_task(&self, id: Uuid) -> Result<Option<StudentTask>> {
        Ok(self
            .read()
            .student_tasks
            .iter()
            .find(|st| st.id == id)
            .cloned())
    }

    async fn list_assigned_tasks(&self, user_id: Uuid) -> Result<Vec<AssignedTask>> {
        let inner = self.read();
        let mut rows: Vec<AssignedTask> = inner
            .student_tasks
            .iter()
            .filter(|st| st.user_id == user_id)
            .filter_map(|st| {
                let task = inner.tasks.iter().find(|t| t.id == st.task_id)?;
                let submission = inner
                    .task_submissions
                    .iter()
                    .find(|s| s.task_id == st.task_id && s.student_id == user_id);
                Some(AssignedTask {
                    student_task_id: st.id,
                    task_id: task.id,
                    title: task.title.clone(),
                    description: task.description.clone(),
                    week: task.week,
                    due_date: task.due_date,
                    assigned_at: st.assigned_at,
                    submission_id: submission.map(|s| s.id),
                    submission_status: submission.map(|s| s.status),
                    feedback: submission.and_then(|s| s.feedback.clone()),
                })
            })
            .collect();
        rows.sort_by_key(|r| (r.week.is_none(), r.week, r.assigned_at));
        Ok(rows)
    }

    async fn find_task_submission(&self, id: Uuid) -> Result<Option<TaskSubmission>> {
        Ok(self
            .read()
            .task_submissions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn find_task_submission_for(
        &self,
        student_id: Uuid,
        task_id: Uuid,
    ) -> Result<Option<TaskSubmission>> {
        Ok(self
            .read()
            .task_submissions
            .iter()
            .find(|s| s.student_id == student_id && s.task_id == task_id)
            .cloned())
    }

    async fn insert_task_submission(
        &self,
        submission: NewTaskSubmission,
    ) -> Result<TaskSubmission> {
        let mut inner = self.write();
        match inner.pending_insert_failure.take() {
            Some(InsertFailure::Conflict) => {
                return Err(StoreError::Conflict(
                    "task_submissions_student_task_key".into(),
                ))
            }
            Some(InsertFailure::Unavailable) => {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut))
            }
            None => {}
        }
        if inner
            .task_submissions
            .iter()
            .any(|s| s.student_id == submission.student_id && s.task_id == submission.task_id)
        {
            return Err(StoreError::Conflict(
                "task_submissions_student_task_key".into(),
            ));
        }
        let now = Utc::now();
        let created = TaskSubmission {
            id: Uuid::new_v4(),
            student_id: submission.student_id,
            task_id: submission.task_id,
            answer_text: submission.answer_text,
            file_url: submission.file_url,
            status: SubmissionStatus::Submitted,
            feedback: None,
            created_at: now,
            updated_at: now,
            reviewed_at: None,
        };
        inner.task_submissions.push(created.clone());
        Ok(created)
    }

    async fn resubmit_task_submission(
        &self,
        id: Uuid,
        answer_text: Option<String>,
        file_url: Option<String>,
    ) -> Result<Option<TaskSubmission>> {
        let mut inner = self.write();
        let Some(submission) = inner
            .task_submissions
            .iter_mut()
            .find(|s| s.id == id && s.status == SubmissionStatus::Rejected)
        else {
            return Ok(None);
        };
        submission.answer_text = answer_text;
        if file_url.is_some() {
            submission.file_url = file_url;
        }
        submission.status = SubmissionStatus::Submitted;
        submission.feedback = None;
        submission.reviewed_at = None;
        submission.updated_at = Utc::now();
        Ok(Some(submission.clone()))
    }

    async fn review_task_submission(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        feedback: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<TaskSubmission>> {
        let mut inner = self.write();
        let Some(submission) = inner
            .task_submissions
            .iter_mut()
            .find(|s| s.id == id && s.status == SubmissionStatus::Submitted)
        else {
            return Ok(None);
        };
        submission.status = status;
        submission.feedback = feedback;
        submission.reviewed_at = Some(reviewed_at);
        submission.updated_at = reviewed_at;
        Ok(Some(submission.clone()))
    }

    async fn list_task_submissions(
        &self,
        status: SubmissionStatus,
    ) -> Result<Vec<TaskSubmission>> {
        let mut rows: Vec<TaskSubmission> = self
            .read()
            .task_submissions
            .iter()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.updated_at);
        Ok(rows)
    }

    async fn latest_project_submission(
        &self,
        student_id: Uuid,
    ) -> Result<Option<ProjectSubmission>> {
        Ok(self
            .read()
            .projects
            .iter()
            .filter(|p| p.student_id == student_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_project_submission(&self, id: Uuid) -> Result<Option<ProjectSubmission>> {
        Ok(self.read().projects.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_project_submission(
        &self,
        submission: NewProjectSubmission,
    ) -> Result<ProjectSubmission> {
        let mut inner = self.write();
        if inner.has_live_project(submission.student_id) {
            return Err(StoreError::Conflict(
                "project_submissions_one_live_key".into(),
            ));
        }
        let now = Utc::now();
        let created = ProjectSubmission {
            id: Uuid::new_v4(),
            student_id: submission.student_id,
            title: submission.title,
            description: submission.description,
            file_url: submission.file_url,
            github_repo: submission.github_repo,
            status: ProjectStatus::Submitted,
            feedback: None,
            submitted_at: Some(now),
            reviewed_at: None,
            created_at: now,
        };
        inner.projects.push(created.clone());
        Ok(created)
    }

    async fn submit_project_placeholder(
        &self,
        id: Uuid,
        submission: NewProjectSubmission,
    ) -> Result<Option<ProjectSubmission>> {
        let mut inner = self.write();
        if inner.has_live_project(submission.student_id) {
            return Err(StoreError::Conflict(
                "project_submissions_one_live_key".into(),
            ));
        }
        let Some(project) = inner
            .projects
            .iter_mut()
            .find(|p| p.id == id && p.status == ProjectStatus::NotSubmitted)
        else {
            return Ok(None);
        };
        project.title = submission.title;
        project.description = submission.description;
        project.file_url = submission.file_url;
        project.github_repo = submission.github_repo;
        project.status = ProjectStatus::Submitted;
        project.submitted_at = Some(Utc::now());
        Ok(Some(project.clone()))
    }

    async fn review_project_submission(
        &self,
        id: Uuid,
        status: ProjectStatus,
        feedback: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<ProjectSubmission>> {
        let mut inner = self.write();
        let Some(project) = inner
            .projects
            .iter_mut()
            .find(|p| p.id == id && p.status.is_reviewable())
        else {
            return Ok(None);
        };
        project.status = status;
        project.feedback = feedback;
        project.reviewed_at = Some(reviewed_at);
        Ok(Some(project.clone()))
    }

    async fn list_project_submissions(
        &self,
        status: ProjectStatus,
    ) -> Result<Vec<ProjectSubmission>> {
        let mut rows: Vec<ProjectSubmission> = self
            .read()
            .projects
            .iter()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }

    async fn mark_attendance(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<Attendance> {
        let mut inner = self.write();
        if let Some(existing) = inner
            .attendance
            .iter_mut()
            .find(|a| a.user_id == user_id && a.date == date)
        {
            existing.status = status;
            return Ok(existing.clone());
        }
        let record = Attendance {
            id: Uuid::new_v4(),
            user_id,
            date,
            status,
        };
        inner.attendance.push(record.clone());
        Ok(record)
    }

    async fn list_attendance(&self, user_id: Uuid) -> Result<Vec<Attendance>> {
        let mut rows: Vec<Attendance> = self
            .read()
            .attendance
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn create_notification(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };
        self.write().notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let mut rows: Vec<Notification> = self
            .read()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64> {
        let count = self
            .read()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count();
        Ok(count as i64)
    }

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self
            .read()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        if let Some(n) = self.write().notifications.iter_mut().find(|n| n.id == id) {
            n.is_read = true;
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let mut updated = 0;
        for n in self
            .write()
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn create_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.write().messages.push(message.clone());
        Ok(message)
    }

    async fn conversation(&self, a: Uuid, b: Uuid, limit: i64) -> Result<Vec<Message>> {
        let mut rows: Vec<Message> = self
            .read()
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        let keep = usize::try_from(limit).unwrap_or(0);
        if rows.len() > keep {
            rows.drain(..rows.len() - keep);
        }
        Ok(rows)
    }

    async fn create_lead(&self, lead: NewLead) -> Result<ContactLead> {
        let created = ContactLead {
            id: Uuid::new_v4(),
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            message: lead.message,
            kind: lead.kind,
            created_at: Utc::now(),
        };
        self.write().leads.push(created.clone());
        Ok(created)
    }

    async fn count_leads(&self) -> Result<i64> {
        Ok(self.read().leads.len() as i64)
    }

    async fn student_counts(&self, since: DateTime<Utc>) -> Result<StudentCounts> {
        let inner = self.read();
        let students = inner
            .users
            .iter()
            .filter(|u| u.user.role == Role::Student);

        let mut counts = StudentCounts::default();
        for stored in students {
            counts.total += 1;
            let active = inner
                .profiles
                .get(&stored.user.id)
                .is_some_and(|p| p.status == StudentStatus::Active);
            if active {
                counts.active += 1;
            }
            if stored.user.created_at >= since {
                counts.new_since += 1;
            }
        }
        Ok(counts)
    }
}
