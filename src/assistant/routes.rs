use actix_web::{post, web, HttpRequest, HttpResponse};

use crate::assistant::build_prompt;
use crate::assistant::models::*;
use crate::error::ApiError;
use crate::security::rate_limit::LimitClass;
use crate::security::{secure_error, validate_body, validate_length};
use crate::AppState;

const MAX_MESSAGE_CHARS: usize = 4000;
const CHAT_ERROR: &str = "Chat API error. Please try again.";

#[post("/api/chat")]
pub async fn chat(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    data.limits.check_request(LimitClass::Api, &req)?;

    let request: ChatRequest = validate_body(&body)?;
    for message in &request.messages {
        validate_length(&message.content, 1, MAX_MESSAGE_CHARS, "Message")?;
    }

    let Some(client) = data.assistant.as_ref() else {
        tracing::warn!("Chat requested but no assistant is configured");
        return Err(ApiError::Internal(CHAT_ERROR.to_string()));
    };

    let prompt = build_prompt(&request.messages);
    let content = client
        .complete(&prompt)
        .await
        .map_err(|e| secure_error(e, CHAT_ERROR))?;

    Ok(HttpResponse::Ok().json(ChatReply {
        role: ChatRole::Assistant,
        content,
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(chat);
}
