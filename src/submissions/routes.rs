use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpRequest, HttpResponse};

use crate::auth::guard::{require_role, AdminUser, StudentUser};
use crate::auth::models::Role;
use crate::error::ApiError;
use crate::security::rate_limit::LimitClass;
use crate::security::{secure_error, validate_body};
use crate::submissions::lifecycle::{parse_status_filter, SubmissionLifecycle, MAX_TASK_FILE_BYTES};
use crate::submissions::models::*;
use crate::upload::multipart::read_form;
use crate::AppState;

fn lifecycle(data: &AppState) -> SubmissionLifecycle<'_> {
    SubmissionLifecycle::new(data.store.as_ref(), data.files.as_ref())
}

#[post("/api/student/tasks/submit")]
pub async fn submit_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    data.limits.check_request(LimitClass::Api, &req)?;
    let identity = require_role(&req, Role::Student).await?;

    let mut form = read_form(
        payload,
        "file",
        MAX_TASK_FILE_BYTES,
        data.config.upload_timeout,
    )
    .await?;
    let submission_form = TaskSubmissionForm {
        task_id: form.take("taskId"),
        student_task_id: form.take("studentTaskId"),
        answer_text: form.take("answerText"),
        submission_id: form.take("submissionId"),
        file: form.file.take(),
    };

    let outcome = lifecycle(&data)
        .create_or_resubmit(&identity, submission_form)
        .await?;

    let message = if outcome.resubmitted {
        "Task resubmitted successfully"
    } else {
        "Task submitted successfully"
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": message,
        "submission": outcome.submission,
    })))
}

#[post("/api/admin/tasks/review")]
pub async fn review_task(
    data: web::Data<AppState>,
    AdminUser(identity): AdminUser,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: ReviewRequest = validate_body(&body)?;

    let submission = lifecycle(&data)
        .review_task(
            &identity,
            &req.submission_id,
            &req.action,
            req.feedback.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "submission": submission,
    })))
}

#[post("/api/admin/projects/review")]
pub async fn review_project(
    data: web::Data<AppState>,
    AdminUser(identity): AdminUser,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: ReviewRequest = validate_body(&body)?;

    let submission = lifecycle(&data)
        .review_project(
            &identity,
            &req.submission_id,
            &req.action,
            req.feedback.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "submission": submission,
    })))
}

#[get("/api/student/project")]
pub async fn get_own_project(
    data: web::Data<AppState>,
    StudentUser(identity): StudentUser,
) -> Result<HttpResponse, ApiError> {
    let project = data
        .store
        .latest_project_submission(identity.user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch project"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "project": project,
    })))
}

#[post("/api/student/project")]
pub async fn submit_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    data.limits.check_request(LimitClass::Api, &req)?;
    let identity = require_role(&req, Role::Student).await?;

    let request: CreateProjectRequest = validate_body(&body)?;
    let project = lifecycle(&data).create_project(&identity, request).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "project": project,
    })))
}

#[get("/api/admin/submissions")]
pub async fn list_task_submissions(
    data: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, ApiError> {
    let status = parse_status_filter(query.status.as_deref(), SubmissionStatus::Submitted)?;
    let submissions = data
        .store
        .list_task_submissions(status)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch submissions"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "submissions": submissions,
    })))
}

#[get("/api/admin/projects")]
pub async fn list_project_submissions(
    data: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, ApiError> {
    let status = parse_status_filter(query.status.as_deref(), ProjectStatus::Submitted)?;
    let projects = data
        .store
        .list_project_submissions(status)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch projects"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "projects": projects,
    })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(submit_task)
        .service(review_task)
        .service(review_project)
        .service(get_own_project)
        .service(submit_project)
        .service(list_task_submissions)
        .service(list_project_submissions);
}
