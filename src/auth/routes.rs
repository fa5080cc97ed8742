use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::guard::{bearer_token, Authenticated};
use crate::auth::models::*;
use crate::error::ApiError;
use crate::security::{sanitize_text, secure_error, validate_body};
use crate::store::StoreError;
use crate::AppState;

const BCRYPT_COST: u32 = 10;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_session_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[post("/api/auth/register")]
pub async fn register(
    data: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let req: RegisterRequest = validate_body(&body)?;

    let email = normalize_email(&req.email);
    let name = sanitize_text(&req.name, 100);
    if name.is_empty() {
        return Err(ApiError::bad_request("Name, email, and password are required"));
    }
    let phone = req
        .phone
        .as_deref()
        .map(|p| sanitize_text(p, 30))
        .filter(|p| !p.is_empty());

    let password = req.password;
    let password_hash = web::block(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| secure_error(e, "Failed to register user"))?
        .map_err(|e| secure_error(e, "Failed to register user"))?;

    let user = data
        .store
        .create_user(NewUser {
            name,
            email,
            password_hash,
            phone,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::bad_request("Email already registered"),
            other => secure_error(other, "Failed to register user"),
        })?;

    tracing::info!("✅ User registered: id={}, email={}", user.id, user.email);

    Ok(HttpResponse::Created().json(RegisterResponse {
        message: "User registered successfully".to_string(),
        user_id: user.id,
        email: user.email,
    }))
}

#[post("/api/auth/login")]
pub async fn login(data: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    let req: LoginRequest = validate_body(&body)?;
    let email = normalize_email(&req.email);

    let creds = data
        .store
        .find_credentials(&email)
        .await
        .map_err(|e| secure_error(e, "Failed to sign in"))?;

    let Some(creds) = creds else {
        tracing::warn!("Login attempt for unknown email");
        return Err(ApiError::Unauthorized);
    };

    let password = req.password;
    let hash = creds.password_hash.clone();
    let valid = web::block(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| secure_error(e, "Failed to sign in"))?
        .unwrap_or(false);

    if !valid {
        tracing::warn!(user_id = %creds.id, "Login rejected: wrong password");
        return Err(ApiError::Unauthorized);
    }

    let token = new_session_token();
    let expires_at = Utc::now() + Duration::hours(data.config.session_ttl_hours);
    data.store
        .create_session(&token, creds.id, expires_at)
        .await
        .map_err(|e| secure_error(e, "Failed to sign in"))?;

    let user = data
        .store
        .find_user(creds.id)
        .await
        .map_err(|e| secure_error(e, "Failed to sign in"))?
        .ok_or(ApiError::Unauthorized)?;

    tracing::info!(user_id = %user.id, role = %user.role, "Session issued");

    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        expires_at,
        user,
    }))
}

#[post("/api/auth/logout")]
pub async fn logout(
    data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;
    data.store
        .delete_session(token)
        .await
        .map_err(|e| secure_error(e, "Failed to sign out"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[get("/api/auth/me")]
pub async fn get_current_user(
    data: web::Data<AppState>,
    Authenticated(identity): Authenticated,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .store
        .find_user(identity.user_id)
        .await
        .map_err(|e| secure_error(e, "Failed to load user"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(user))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(logout)
        .service(get_current_user);
}
