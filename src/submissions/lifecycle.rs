//! Task and project submission state machines.
//!
//! Task submissions go `SUBMITTED -> ACCEPTED` (terminal) or
//! `SUBMITTED -> REJECTED -> SUBMITTED` through an in-place resubmit. There
//! is at most one row per (student, task); the store's unique constraint is
//! the authority and every check here only produces a friendlier error.
//!
//! Projects go `NOT_SUBMITTED -> SUBMITTED` and are reviewed from SUBMITTED
//! or UNDER_REVIEW into APPROVED or REJECTED. There is no project resubmit.

use chrono::Utc;

use crate::auth::models::{Identity, Role};
use crate::error::ApiError;
use crate::notifications::notify_best_effort;
use crate::security::{parse_uuid, sanitize_filename, sanitize_text, secure_error};
use crate::storage::FileStorage;
use crate::store::{Store, StoreError};
use crate::submissions::models::*;

pub const MAX_TASK_FILE_BYTES: usize = 10 * 1024 * 1024;

pub const ALLOWED_TASK_FILE_TYPES: &[&str] = &[
    "application/pdf",
    "application/zip",
    "application/x-zip-compressed",
    "image/jpeg",
    "image/jpg",
    "image/png",
];

const MAX_ANSWER_CHARS: usize = 10_000;
const MAX_FEEDBACK_CHARS: usize = 2000;
const TASK_UPLOAD_DIR: &str = "tasks";

const ALREADY_SUBMITTED: &str = "This task has already been submitted";
const ALREADY_REVIEWED: &str = "Submission has already been reviewed";
const PROJECT_ALREADY_SUBMITTED: &str = "Project has already been submitted";

#[derive(Debug)]
pub struct SubmitOutcome {
    pub submission: TaskSubmission,
    pub resubmitted: bool,
}

pub struct SubmissionLifecycle<'a> {
    store: &'a dyn Store,
    files: &'a dyn FileStorage,
}

fn ensure_role(identity: &Identity, role: Role) -> Result<(), ApiError> {
    if identity.role != role {
        return Err(ApiError::forbidden("Forbidden"));
    }
    Ok(())
}

fn non_empty(text: Option<&str>, max_len: usize) -> Option<String> {
    text.map(|t| sanitize_text(t, max_len))
        .filter(|t| !t.is_empty())
}

/// Checks type and size of an uploaded task file, returning its safe name.
fn validate_task_file(file: &UploadedFile) -> Result<String, ApiError> {
    if !ALLOWED_TASK_FILE_TYPES.contains(&file.content_type.as_str()) {
        return Err(ApiError::bad_request(
            "Invalid file type. Allowed: PDF, ZIP, JPEG, PNG",
        ));
    }
    if file.oversized || file.size() > MAX_TASK_FILE_BYTES {
        return Err(ApiError::bad_request("File size exceeds 10MB limit"));
    }
    sanitize_filename(&file.filename)
}

fn is_link(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

impl<'a> SubmissionLifecycle<'a> {
    pub fn new(store: &'a dyn Store, files: &'a dyn FileStorage) -> Self {
        Self { store, files }
    }

    /// Creates the caller's submission for a task, or reopens it when the
    /// previous attempt was rejected. Everything is validated before the
    /// file is written, and the file is written before the row.
    pub async fn create_or_resubmit(
        &self,
        identity: &Identity,
        form: TaskSubmissionForm,
    ) -> Result<SubmitOutcome, ApiError> {
        ensure_role(identity, Role::Student)?;

        let (Some(raw_task_id), Some(raw_student_task_id)) =
            (form.task_id.as_deref(), form.student_task_id.as_deref())
        else {
            return Err(ApiError::bad_request("Task ID and student task ID are required"));
        };
        let task_id = parse_uuid(raw_task_id.trim(), "task ID")?;
        let student_task_id = parse_uuid(raw_student_task_id.trim(), "student task ID")?;
        let submission_id = form
            .submission_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_uuid(s, "submission ID"))
            .transpose()?;

        let answer_text = non_empty(form.answer_text.as_deref(), MAX_ANSWER_CHARS);
        let file = form.file.filter(|f| f.oversized || f.size() > 0);
        if answer_text.is_none() && file.is_none() {
            return Err(ApiError::bad_request("Provide an answer or upload a file"));
        }

        let safe_name = file.as_ref().map(validate_task_file).transpose()?;

        let student_task = self
            .store
            .find_student_task(student_task_id)
            .await
            .map_err(|e| secure_error(e, "Failed to submit task"))?
            .ok_or_else(|| ApiError::not_found("Task not found"))?;
        if student_task.user_id != identity.user_id {
            tracing::warn!(
                user_id = %identity.user_id,
                %student_task_id,
                "Submission attempt on another student's task"
            );
            return Err(ApiError::forbidden("Forbidden"));
        }
        if student_task.task_id != task_id {
            return Err(ApiError::bad_request("Task ID does not match the assignment"));
        }

        let existing = match submission_id {
            Some(id) => Some(
                self.store
                    .find_task_submission(id)
                    .await
                    .map_err(|e| secure_error(e, "Failed to submit task"))?
                    .ok_or_else(|| ApiError::not_found("Submission not found"))?,
            ),
            None => self
                .store
                .find_task_submission_for(identity.user_id, task_id)
                .await
                .map_err(|e| secure_error(e, "Failed to submit task"))?,
        };
        if let Some(existing) = &existing {
            if existing.student_id != identity.user_id {
                return Err(ApiError::forbidden("Forbidden"));
            }
            if existing.task_id != task_id {
                return Err(ApiError::bad_request("Submission does not belong to this task"));
            }
            if existing.status != SubmissionStatus::Rejected {
                return Err(ApiError::conflict(ALREADY_SUBMITTED));
            }
        }

        let file_url = match (file, safe_name) {
            (Some(file), Some(safe_name)) => {
                let name = format!(
                    "{}-{}-{}-{}",
                    identity.user_id,
                    task_id,
                    Utc::now().timestamp_millis(),
                    safe_name
                );
                let url = self
                    .files
                    .store(TASK_UPLOAD_DIR, &name, &file.bytes)
                    .await
                    .map_err(|e| secure_error(e, "Failed to upload file"))?;
                Some(url)
            }
            _ => None,
        };

        let written = match &existing {
            Some(existing) => self
                .store
                .resubmit_task_submission(existing.id, answer_text, file_url.clone())
                .await
                .map(|row| row.map(|s| (s, true))),
            None => self
                .store
                .insert_task_submission(NewTaskSubmission {
                    student_id: identity.user_id,
                    task_id,
                    answer_text,
                    file_url: file_url.clone(),
                })
                .await
                .map(|s| Some((s, false))),
        };

        let outcome = match written {
            Ok(Some((submission, resubmitted))) => SubmitOutcome {
                submission,
                resubmitted,
            },
            Ok(None) => {
                self.discard_file(file_url.as_deref()).await;
                return Err(ApiError::conflict(ALREADY_SUBMITTED));
            }
            Err(StoreError::Conflict(_)) => {
                self.discard_file(file_url.as_deref()).await;
                return Err(ApiError::conflict(ALREADY_SUBMITTED));
            }
            Err(e) => {
                self.discard_file(file_url.as_deref()).await;
                return Err(secure_error(e, "Failed to submit task"));
            }
        };

        tracing::info!(
            submission_id = %outcome.submission.id,
            student_id = %identity.user_id,
            %task_id,
            resubmitted = outcome.resubmitted,
            "Task submission recorded"
        );
        Ok(outcome)
    }

    async fn discard_file(&self, url: Option<&str>) {
        if let Some(url) = url {
            self.files.remove(url).await;
        }
    }

    pub async fn review_task(
        &self,
        identity: &Identity,
        submission_id: &str,
        action: &str,
        feedback: Option<&str>,
    ) -> Result<TaskSubmission, ApiError> {
        ensure_role(identity, Role::Admin)?;

        let id = parse_uuid(submission_id.trim(), "submission ID")?;
        let action: TaskReviewAction = action.parse()?;
        let feedback = non_empty(feedback, MAX_FEEDBACK_CHARS);
        if action == TaskReviewAction::Reject && feedback.is_none() {
            return Err(ApiError::bad_request("Feedback is required when rejecting"));
        }

        let current = self
            .store
            .find_task_submission(id)
            .await
            .map_err(|e| secure_error(e, "Failed to review submission"))?
            .ok_or_else(|| ApiError::not_found("Submission not found"))?;
        if current.status != SubmissionStatus::Submitted {
            return Err(ApiError::conflict(ALREADY_REVIEWED));
        }

        let status = match action {
            TaskReviewAction::Accept => SubmissionStatus::Accepted,
            TaskReviewAction::Reject => SubmissionStatus::Rejected,
        };
        let reviewed = self
            .store
            .review_task_submission(id, status, feedback, Utc::now())
            .await
            .map_err(|e| secure_error(e, "Failed to review submission"))?
            .ok_or_else(|| ApiError::conflict(ALREADY_REVIEWED))?;

        tracing::info!(
            submission_id = %id,
            reviewer = %identity.user_id,
            status = ?reviewed.status,
            "Task submission reviewed"
        );

        let task_title = match self.store.find_task(reviewed.task_id).await {
            Ok(Some(task)) => task.title,
            _ => "your task".to_string(),
        };
        let (title, message) = match action {
            TaskReviewAction::Accept => (
                "Task accepted",
                format!("Your submission for \"{task_title}\" was accepted."),
            ),
            TaskReviewAction::Reject => (
                "Task needs changes",
                format!("Your submission for \"{task_title}\" was rejected. Check the feedback and resubmit."),
            ),
        };
        notify_best_effort(self.store, reviewed.student_id, title, &message).await;

        Ok(reviewed)
    }

    pub async fn review_project(
        &self,
        identity: &Identity,
        submission_id: &str,
        action: &str,
        feedback: Option<&str>,
    ) -> Result<ProjectSubmission, ApiError> {
        ensure_role(identity, Role::Admin)?;

        let id = parse_uuid(submission_id.trim(), "submission ID")?;
        let action: ProjectReviewAction = action.parse()?;
        let feedback = non_empty(feedback, MAX_FEEDBACK_CHARS);

        let current = self
            .store
            .find_project_submission(id)
            .await
            .map_err(|e| secure_error(e, "Failed to review project"))?
            .ok_or_else(|| ApiError::not_found("Project submission not found"))?;
        if !current.status.is_reviewable() {
            return Err(ApiError::conflict(ALREADY_REVIEWED));
        }

        let status = match action {
            ProjectReviewAction::Approve => ProjectStatus::Approved,
            ProjectReviewAction::Reject => ProjectStatus::Rejected,
        };
        let reviewed = self
            .store
            .review_project_submission(id, status, feedback, Utc::now())
            .await
            .map_err(|e| secure_error(e, "Failed to review project"))?
            .ok_or_else(|| ApiError::conflict(ALREADY_REVIEWED))?;

        tracing::info!(
            project_id = %id,
            reviewer = %identity.user_id,
            status = ?reviewed.status,
            "Project submission reviewed"
        );

        let (title, message) = match action {
            ProjectReviewAction::Approve => (
                "Project approved",
                format!("Your project \"{}\" was approved.", reviewed.title),
            ),
            ProjectReviewAction::Reject => (
                "Project rejected",
                format!("Your project \"{}\" was rejected.", reviewed.title),
            ),
        };
        notify_best_effort(self.store, reviewed.student_id, title, &message).await;

        Ok(reviewed)
    }

    /// Submits the caller's final project, filling a NOT_SUBMITTED
    /// placeholder when one exists.
    pub async fn create_project(
        &self,
        identity: &Identity,
        req: CreateProjectRequest,
    ) -> Result<ProjectSubmission, ApiError> {
        ensure_role(identity, Role::Student)?;

        let title = sanitize_text(&req.title, 200);
        if title.is_empty() {
            return Err(ApiError::bad_request("Title is required"));
        }
        let description = non_empty(req.description.as_deref(), 5000);

        let github_repo = req
            .github_repo
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(repo) = &github_repo {
            if !is_link(repo) {
                return Err(ApiError::bad_request("Repository link must be a valid URL"));
            }
        }
        let file_url = req
            .file_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(url) = &file_url {
            if !is_link(url) && !url.starts_with("/uploads/") {
                return Err(ApiError::bad_request("Invalid file URL"));
            }
        }
        if github_repo.is_none() && file_url.is_none() {
            return Err(ApiError::bad_request(
                "Provide a repository link or a file URL",
            ));
        }

        let submission = NewProjectSubmission {
            student_id: identity.user_id,
            title,
            description,
            file_url,
            github_repo,
        };

        let latest = self
            .store
            .latest_project_submission(identity.user_id)
            .await
            .map_err(|e| secure_error(e, "Failed to submit project"))?;

        let write_failed = |e: StoreError| match e {
            StoreError::Conflict(_) => ApiError::conflict(PROJECT_ALREADY_SUBMITTED),
            other => secure_error(other, "Failed to submit project"),
        };
        let project = match latest {
            Some(p) if p.status == ProjectStatus::NotSubmitted => self
                .store
                .submit_project_placeholder(p.id, submission)
                .await
                .map_err(write_failed)?
                .ok_or_else(|| ApiError::conflict(PROJECT_ALREADY_SUBMITTED))?,
            Some(_) => return Err(ApiError::conflict(PROJECT_ALREADY_SUBMITTED)),
            None => self
                .store
                .insert_project_submission(submission)
                .await
                .map_err(write_failed)?,
        };

        tracing::info!(project_id = %project.id, student_id = %identity.user_id, "Project submitted");
        Ok(project)
    }
}

/// Parses an optional `?status=` filter, falling back to `default`.
pub fn parse_status_filter<T>(raw: Option<&str>, default: T) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => serde_json::from_value(serde_json::Value::String(s.to_uppercase()))
            .map_err(|_| ApiError::bad_request("Invalid status filter")),
    }
}
