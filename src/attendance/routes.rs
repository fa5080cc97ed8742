use actix_web::{get, post, web, HttpResponse};

use crate::attendance::models::*;
use crate::auth::guard::{AdminUser, StudentUser};
use crate::auth::models::Role;
use crate::error::ApiError;
use crate::security::{parse_uuid, secure_error, validate_body};
use crate::AppState;

#[post("/api/attendance/mark")]
pub async fn mark_attendance(
    data: web::Data<AppState>,
    AdminUser(identity): AdminUser,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: MarkAttendanceRequest = validate_body(&body)?;
    let user_id = parse_uuid(req.user_id.trim(), "user ID")?;

    let student = data
        .store
        .find_user(user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to mark attendance"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if student.role != Role::Student {
        return Err(ApiError::bad_request(
            "Attendance can only be recorded for students",
        ));
    }

    let record = data
        .store
        .mark_attendance(user_id, req.date, req.status)
        .await
        .map_err(|e| secure_error(e, "Failed to mark attendance"))?;

    tracing::info!(
        student_id = %user_id,
        date = %record.date,
        status = ?record.status,
        admin = %identity.user_id,
        "Attendance marked"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "attendance": record,
    })))
}

#[get("/api/student/attendance")]
pub async fn get_own_attendance(
    data: web::Data<AppState>,
    StudentUser(identity): StudentUser,
) -> Result<HttpResponse, ApiError> {
    let records = data
        .store
        .list_attendance(identity.user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch attendance"))?;

    Ok(HttpResponse::Ok().json(AttendanceSummary::from_records(records)))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(mark_attendance).service(get_own_attendance);
}
