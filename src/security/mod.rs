//! Input validation and sanitization shared by every handler.
//!
//! Nothing here touches the database. Handlers run these checks before any
//! lookup so that malformed identifiers never reach a query.

pub mod rate_limit;

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

use regex::Regex;
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

/// Ceiling for JSON request bodies.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const MAX_FILENAME_LEN: usize = 255;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("invalid uuid pattern")
});

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("invalid email pattern"));

static SCRIPT_PROTOCOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("invalid protocol pattern"));

static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on\w+=").expect("invalid handler pattern"));

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("invalid filename pattern"));

static ERROR_DETAIL: AtomicBool = AtomicBool::new(false);

/// Enables logging of internal error detail. Off in production.
pub fn set_error_detail(enabled: bool) {
    ERROR_DETAIL.store(enabled, Ordering::Relaxed);
}

/// Parses `raw` as JSON into `T` and runs its declared validation rules.
pub fn validate_body<T>(raw: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + Validate,
{
    if raw.len() > MAX_BODY_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }

    let value: T =
        serde_json::from_slice(raw).map_err(|_| ApiError::bad_request("Invalid JSON format"))?;

    value
        .validate()
        .map_err(|errors| ApiError::BadRequest(first_validation_message::<T>(&errors)))?;

    Ok(value)
}

/// Picks the message of the first failing field in declaration order.
fn first_validation_message<T: DeserializeOwned>(errors: &validator::ValidationErrors) -> String {
    let declared = declared_fields::<T>();
    let rank = |field: &str| {
        let key = field_key(field);
        declared
            .iter()
            .position(|name| field_key(name) == key)
            .unwrap_or(usize::MAX)
    };

    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| (rank(&*a.0), &*a.0).cmp(&(rank(&*b.0), &*b.0)));

    fields
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .unwrap_or_else(|| "Invalid input".to_string())
}

// Serde reports renamed keys (`dueDate`), validator reports Rust names (`due_date`).
fn field_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Field names of `T` in declaration order, as its derived `Deserialize` lists them.
fn declared_fields<T: DeserializeOwned>() -> &'static [&'static str] {
    struct FieldNames<'a>(&'a mut &'static [&'static str]);

    impl<'de> Deserializer<'de> for FieldNames<'_> {
        type Error = serde::de::value::Error;

        fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
            Err(de::Error::custom("field listing only"))
        }

        fn deserialize_struct<V: Visitor<'de>>(
            self,
            _name: &'static str,
            fields: &'static [&'static str],
            _visitor: V,
        ) -> Result<V::Value, Self::Error> {
            *self.0 = fields;
            Err(de::Error::custom("field listing only"))
        }

        serde::forward_to_deserialize_any! {
            bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
            bytes byte_buf option unit unit_struct newtype_struct seq tuple
            tuple_struct map enum identifier ignored_any
        }
    }

    let mut fields: &'static [&'static str] = &[];
    let _ = T::deserialize(FieldNames(&mut fields));
    fields
}

/// Trims, truncates and strips markup-ish patterns from freeform text.
/// Rendering code still has to encode output.
pub fn sanitize_text(text: &str, max_len: usize) -> String {
    let truncated: String = text.trim().chars().take(max_len).collect();
    let stripped = truncated.replace(['<', '>'], "");
    let stripped = SCRIPT_PROTOCOL.replace_all(&stripped, "");
    EVENT_HANDLER.replace_all(&stripped, "").into_owned()
}

pub fn is_valid_uuid(value: &str) -> bool {
    UUID_PATTERN.is_match(value)
}

/// Gate for any identifier that is used as a primary-key lookup.
pub fn parse_uuid(value: &str, what: &str) -> Result<Uuid, ApiError> {
    if !is_valid_uuid(value) {
        return Err(ApiError::BadRequest(format!("Invalid {what} format")));
    }
    Uuid::parse_str(value).map_err(|_| ApiError::BadRequest(format!("Invalid {what} format")))
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_PATTERN.is_match(email)
}

pub fn validate_length(value: &str, min: usize, max: usize, field: &str) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min {
        return Err(ApiError::BadRequest(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Reduces an uploaded filename to a safe character set. The result is only
/// ever used as a suffix of a generated storage name.
pub fn sanitize_filename(name: &str) -> Result<String, ApiError> {
    let safe = UNSAFE_FILENAME_CHARS.replace_all(name, "_").into_owned();
    if safe.is_empty() || safe.len() > MAX_FILENAME_LEN {
        return Err(ApiError::bad_request("Invalid file name"));
    }
    Ok(safe)
}

/// Turns an unexpected failure into a generic 500. Detail is logged only
/// when error detail is enabled.
pub fn secure_error<E: Display>(err: E, fallback: &str) -> ApiError {
    if ERROR_DETAIL.load(Ordering::Relaxed) {
        tracing::error!(detail = %err, "{fallback}");
    } else {
        tracing::error!("Error occurred: {fallback}");
    }
    ApiError::Internal(fallback.to_string())
}

/// `validator` custom rule: field must look like an email address.
pub fn validate_email_field(email: &str) -> Result<(), validator::ValidationError> {
    if is_valid_email(email.trim()) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("email").with_message("Invalid email format".into()))
    }
}
