use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactLead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub kind: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 100, message = "Name, email, and message are required"))]
    pub name: String,
    #[validate(custom(function = "crate::security::validate_email_field"))]
    pub email: String,
    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 5000, message = "Name, email, and message are required"))]
    pub message: String,
    #[serde(rename = "type")]
    #[validate(length(max = 50, message = "Type must be at most 50 characters"))]
    pub kind: Option<String>,
}
