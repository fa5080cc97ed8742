use actix_web::{get, patch, post, web, HttpResponse};
use uuid::Uuid;

use crate::auth::guard::Authenticated;
use crate::auth::models::Identity;
use crate::error::ApiError;
use crate::progress::models::*;
use crate::security::{parse_uuid, sanitize_text, secure_error, validate_body};
use crate::AppState;

/// Resolves whose progress the caller is addressing. Students only ever
/// reach their own; admins may name anyone.
fn resolve_target(identity: &Identity, requested: Option<&str>) -> Result<Uuid, ApiError> {
    let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(identity.user_id);
    };
    let target = parse_uuid(raw, "user ID")?;
    if target != identity.user_id && !identity.is_admin() {
        return Err(ApiError::forbidden(
            "Forbidden - You can only access your own progress",
        ));
    }
    Ok(target)
}

async fn ensure_user_exists(data: &AppState, user_id: Uuid) -> Result<(), ApiError> {
    let found = data
        .store
        .find_user(user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch progress"))?;
    if found.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(())
}

#[get("/api/student/progress")]
pub async fn get_progress(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
    query: web::Query<ProgressQuery>,
) -> Result<HttpResponse, ApiError> {
    let target = resolve_target(&identity, query.user_id.as_deref())?;
    ensure_user_exists(&data, target).await?;

    let progress = data
        .store
        .find_profile(target)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch progress"))?
        .map(Progress::from)
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "progress": progress,
    })))
}

#[patch("/api/student/progress")]
pub async fn update_progress(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: UpdateProgressRequest = validate_body(&body)?;
    let target = resolve_target(&identity, req.user_id.as_deref())?;
    ensure_user_exists(&data, target).await?;

    let profile = data
        .store
        .upsert_progress(
            target,
            ProgressUpdate {
                progress_week: req.progress_week,
                progress_percent: req.progress_percent,
                status: req.status,
            },
        )
        .await
        .map_err(|e| secure_error(e, "Failed to update progress"))?;

    tracing::info!(user_id = %target, by = %identity.user_id, "Progress updated");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Progress updated successfully",
        "progress": Progress::from(profile),
    })))
}

#[post("/api/student/profile")]
pub async fn update_profile(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: UpdateProfileRequest = validate_body(&body)?;

    let phone = req
        .phone
        .as_deref()
        .map(|p| sanitize_text(p, 30))
        .filter(|p| !p.is_empty());
    let program_track = req
        .program_track
        .as_deref()
        .map(|t| sanitize_text(t, 100))
        .filter(|t| !t.is_empty());

    data.store
        .update_phone(identity.user_id, phone)
        .await
        .map_err(|e| secure_error(e, "Failed to update profile"))?;
    let profile = data
        .store
        .set_program_track(identity.user_id, program_track)
        .await
        .map_err(|e| secure_error(e, "Failed to update profile"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Profile updated successfully",
        "profile": profile,
    })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_progress)
        .service(update_progress)
        .service(update_profile);
}
