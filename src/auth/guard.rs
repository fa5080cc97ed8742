//! Bearer-token identity resolution and role checks.
//!
//! Handlers that rate-limit first call [`require_role`] after the limiter;
//! everything else takes one of the extractors.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::Utc;
use futures_util::future::LocalBoxFuture;
use tracing::warn;

use crate::auth::models::{Identity, Role};
use crate::error::ApiError;
use crate::security::secure_error;
use crate::AppState;

/// Token from `Authorization: Bearer <token>`, if well formed.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub async fn require_authenticated(req: &HttpRequest) -> Result<Identity, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal("Internal server error".into()))?;

    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;

    state
        .store
        .resolve_session(token, Utc::now())
        .await
        .map_err(|e| secure_error(e, "Failed to verify session"))?
        .ok_or(ApiError::Unauthorized)
}

pub async fn require_role(req: &HttpRequest, role: Role) -> Result<Identity, ApiError> {
    let identity = require_authenticated(req).await?;
    if identity.role != role {
        warn!(
            user_id = %identity.user_id,
            required = %role,
            "Denied {} {}",
            req.method(),
            req.path()
        );
        return Err(ApiError::forbidden("Forbidden"));
    }
    Ok(identity)
}

/// Any signed-in user.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

/// Signed-in user with the ADMIN role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

/// Signed-in user with the STUDENT role.
#[derive(Debug, Clone)]
pub struct StudentUser(pub Identity);

impl FromRequest for Authenticated {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { require_authenticated(&req).await.map(Authenticated) })
    }
}

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { require_role(&req, Role::Admin).await.map(AdminUser) })
    }
}

impl FromRequest for StudentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { require_role(&req, Role::Student).await.map(StudentUser) })
    }
}
