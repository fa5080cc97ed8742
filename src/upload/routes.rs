use actix_multipart::Multipart;
use actix_web::{post, web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::auth::guard::require_authenticated;
use crate::error::ApiError;
use crate::security::rate_limit::LimitClass;
use crate::security::secure_error;
use crate::upload::multipart::read_form;
use crate::AppState;

pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

const AVATAR_DIR: &str = "avatars";

fn avatar_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

#[post("/api/upload/avatar")]
pub async fn upload_avatar(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    data.limits.check_request(LimitClass::Upload, &req)?;
    let identity = require_authenticated(&req).await?;

    let form = read_form(payload, "file", MAX_AVATAR_BYTES, data.config.upload_timeout).await?;
    let file = form
        .file
        .filter(|f| f.oversized || f.size() > 0)
        .ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let ext = avatar_extension(&file.content_type).ok_or_else(|| {
        ApiError::bad_request("Invalid file type. Only JPEG and PNG images are allowed")
    })?;
    if file.oversized || file.size() > MAX_AVATAR_BYTES {
        return Err(ApiError::bad_request("File size exceeds 5MB limit"));
    }

    let previous = data
        .store
        .find_user(identity.user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to upload avatar"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?
        .avatar_url;

    let name = format!(
        "{}-{}.{ext}",
        identity.user_id,
        Utc::now().timestamp_millis()
    );
    let url = data
        .files
        .store(AVATAR_DIR, &name, &file.bytes)
        .await
        .map_err(|e| secure_error(e, "Failed to upload avatar"))?;

    if let Err(e) = data.store.set_avatar_url(identity.user_id, &url).await {
        data.files.remove(&url).await;
        return Err(secure_error(e, "Failed to upload avatar"));
    }

    if let Some(old) = previous.filter(|old| old.starts_with("/uploads/avatars/")) {
        data.files.remove(&old).await;
    }

    tracing::info!(user_id = %identity.user_id, "Avatar updated");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Avatar uploaded successfully",
        "avatarUrl": url,
    })))
}

/// Only mounted when avatar uploads are enabled.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(upload_avatar);
}
