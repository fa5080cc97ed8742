use actix_web::{post, web, HttpRequest, HttpResponse};

use crate::contact::models::*;
use crate::error::ApiError;
use crate::security::rate_limit::LimitClass;
use crate::security::{sanitize_text, secure_error, validate_body};
use crate::AppState;

#[post("/api/contact")]
pub async fn submit_contact(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    data.limits.check_request(LimitClass::Contact, &req)?;

    let form: ContactRequest = validate_body(&body)?;

    let name = sanitize_text(&form.name, 100);
    let message = sanitize_text(&form.message, 5000);
    if name.is_empty() || message.is_empty() {
        return Err(ApiError::bad_request("Name, email, and message are required"));
    }

    let lead = NewLead {
        name,
        email: form.email.trim().to_lowercase(),
        phone: form
            .phone
            .as_deref()
            .map(|p| sanitize_text(p, 30))
            .filter(|p| !p.is_empty()),
        message,
        kind: form
            .kind
            .as_deref()
            .map(|k| sanitize_text(k, 50))
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "general".to_string()),
    };

    let lead = data
        .store
        .create_lead(lead)
        .await
        .map_err(|e| secure_error(e, "Failed to send message. Please try again later."))?;

    tracing::info!(lead_id = %lead.id, kind = %lead.kind, "Contact lead received");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Message received successfully",
    })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(submit_contact);
}
