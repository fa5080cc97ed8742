use actix_web::{get, post, web, HttpResponse};

use crate::auth::guard::Authenticated;
use crate::auth::models::Role;
use crate::error::ApiError;
use crate::messages::models::*;
use crate::security::{parse_uuid, sanitize_text, secure_error, validate_body};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[post("/api/messages")]
pub async fn send_message(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: SendMessageRequest = validate_body(&body)?;
    let receiver_id = parse_uuid(req.receiver_id.trim(), "receiver ID")?;

    if receiver_id == identity.user_id {
        return Err(ApiError::bad_request("You cannot message yourself"));
    }

    let receiver = data
        .store
        .find_user(receiver_id)
        .await
        .map_err(|e| secure_error(e, "Failed to send message"))?
        .ok_or_else(|| ApiError::not_found("Receiver not found"))?;

    if !identity.is_admin() && receiver.role != Role::Admin {
        return Err(ApiError::forbidden("Students can only message administrators"));
    }

    let content = sanitize_text(&req.content, 2000);
    if content.is_empty() {
        return Err(ApiError::bad_request("Message must be 1-2000 characters"));
    }

    let message = data
        .store
        .create_message(identity.user_id, receiver_id, &content)
        .await
        .map_err(|e| secure_error(e, "Failed to send message"))?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "message": message,
    })))
}

#[get("/api/messages/contacts")]
pub async fn list_contacts(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
) -> Result<HttpResponse, ApiError> {
    let role = if identity.is_admin() {
        Role::Student
    } else {
        Role::Admin
    };
    let contacts = data
        .store
        .list_users_by_role(role)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch contacts"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "contacts": contacts,
    })))
}

#[get("/api/messages/{peer_id}")]
pub async fn get_conversation(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
    path: web::Path<String>,
    query: web::Query<ConversationQuery>,
) -> Result<HttpResponse, ApiError> {
    let peer_id = parse_uuid(path.trim(), "user ID")?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let messages = data
        .store
        .conversation(identity.user_id, peer_id, limit)
        .await
        .map_err(|e| secure_error(e, "Failed to fetch messages"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "messages": messages,
    })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    // contacts before the {peer_id} catch-all
    cfg.service(send_message)
        .service(list_contacts)
        .service(get_conversation);
}
