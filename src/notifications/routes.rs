use actix_web::{get, patch, post, web, HttpResponse};

use crate::auth::guard::Authenticated;
use crate::error::ApiError;
use crate::notifications::models::*;
use crate::notifications::notify;
use crate::security::{parse_uuid, sanitize_text, secure_error, validate_body};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

#[get("/api/notifications")]
pub async fn list_notifications(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse, ApiError> {
    let unread_only = query.unread_only.unwrap_or(false);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let notifications = data
        .store
        .list_notifications(identity.user_id, unread_only, limit)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch notifications"))?;
    let unread_count = data
        .store
        .count_unread(identity.user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch notifications"))?;

    Ok(HttpResponse::Ok().json(NotificationList {
        success: true,
        notifications,
        unread_count,
    }))
}

#[post("/api/notifications")]
pub async fn create_notification(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: CreateNotificationRequest = validate_body(&body)?;

    let target = match req.user_id.as_deref() {
        Some(raw) => parse_uuid(raw, "user ID")?,
        None => identity.user_id,
    };

    if target != identity.user_id && !identity.is_admin() {
        tracing::warn!(user_id = %identity.user_id, %target, "Notification for another user denied");
        return Err(ApiError::forbidden("Forbidden"));
    }

    let exists = data
        .store
        .find_user(target)
        .await
        .map_err(|e| secure_error(e, "Failed to create notification"))?
        .is_some();
    if !exists {
        return Err(ApiError::not_found("User not found"));
    }

    let title = sanitize_text(&req.title, 200);
    let message = sanitize_text(&req.message, 1000);
    if title.is_empty() || message.is_empty() {
        return Err(ApiError::bad_request("Title and message are required"));
    }

    let notification = notify(data.store.as_ref(), target, &title, &message)
        .await
        .map_err(|e| secure_error(e, "Failed to create notification"))?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "notification": notification,
    })))
}

#[patch("/api/notifications/read")]
pub async fn mark_read(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: MarkReadRequest = if body.is_empty() {
        MarkReadRequest::default()
    } else {
        validate_body(&body)?
    };

    match req.notification_id.as_deref() {
        Some(raw) => {
            let id = parse_uuid(raw, "notification ID")?;
            let notification = data
                .store
                .find_notification(id)
                .await
                .map_err(|e| secure_error(e, "Failed to update notification"))?
                .ok_or_else(|| ApiError::not_found("Notification not found"))?;

            if notification.user_id != identity.user_id {
                return Err(ApiError::forbidden("Forbidden"));
            }

            data.store
                .mark_notification_read(id)
                .await
                .map_err(|e| secure_error(e, "Failed to update notification"))?;

            Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
        }
        None => {
            let updated = data
                .store
                .mark_all_read(identity.user_id)
                .await
                .map_err(|e| secure_error(e, "Failed to update notifications"))?;

            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "updated": updated,
            })))
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_notifications)
        .service(create_notification)
        .service(mark_read);
}
