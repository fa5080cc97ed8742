use actix_web::{get, post, web, HttpResponse};

use crate::auth::guard::{AdminUser, StudentUser};
use crate::auth::models::Role;
use crate::error::ApiError;
use crate::notifications::notify_best_effort;
use crate::security::{parse_uuid, sanitize_text, secure_error, validate_body};
use crate::store::StoreError;
use crate::tasks::models::*;
use crate::AppState;

#[post("/api/admin/tasks")]
pub async fn create_task(
    data: web::Data<AppState>,
    AdminUser(identity): AdminUser,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: CreateTaskRequest = validate_body(&body)?;

    let title = sanitize_text(&req.title, 200);
    let description = sanitize_text(&req.description, 5000);
    if title.is_empty() || description.is_empty() {
        return Err(ApiError::bad_request("Title and description are required"));
    }

    let task = data
        .store
        .create_task(NewTask {
            title,
            description,
            week: req.week,
            due_date: req.due_date,
        })
        .await
        .map_err(|e| secure_error(e, "Failed to create task"))?;

    tracing::info!(task_id = %task.id, admin = %identity.user_id, "Task created");

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "task": task,
    })))
}

#[post("/api/admin/tasks/assign")]
pub async fn assign_task(
    data: web::Data<AppState>,
    AdminUser(identity): AdminUser,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: AssignTaskRequest = validate_body(&body)?;
    let task_id = parse_uuid(req.task_id.trim(), "task ID")?;
    let user_id = parse_uuid(req.user_id.trim(), "user ID")?;

    let task = data
        .store
        .find_task(task_id)
        .await
        .map_err(|e| secure_error(e, "Failed to assign task"))?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    let student = data
        .store
        .find_user(user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to assign task"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if student.role != Role::Student {
        return Err(ApiError::bad_request("Tasks can only be assigned to students"));
    }

    let assignment = data
        .store
        .assign_task(task_id, user_id)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                ApiError::conflict("Task is already assigned to this student")
            }
            other => secure_error(other, "Failed to assign task"),
        })?;

    tracing::info!(
        %task_id,
        student_id = %user_id,
        admin = %identity.user_id,
        "Task assigned"
    );

    notify_best_effort(
        data.store.as_ref(),
        user_id,
        "New task assigned",
        &format!("You have a new task: \"{}\".", task.title),
    )
    .await;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "assignment": assignment,
    })))
}

#[get("/api/student/tasks")]
pub async fn list_own_tasks(
    data: web::Data<AppState>,
    StudentUser(identity): StudentUser,
) -> Result<HttpResponse, ApiError> {
    let tasks = data
        .store
        .list_assigned_tasks(identity.user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch tasks"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "tasks": tasks,
    })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(create_task)
        .service(assign_task)
        .service(list_own_tasks);
}
