use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use shuttle_runtime::SecretStore;
use tracing::{info, warn};

use crate::security::rate_limit::RateLimitConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub production: bool,
    pub public_root: PathBuf,
    pub upload_timeout: Duration,
    pub session_ttl_hours: i64,
    pub contact_rate: RateLimitConfig,
    pub api_rate: RateLimitConfig,
    pub upload_rate: RateLimitConfig,
    /// Capability toggle: the avatar route is only registered when set.
    pub avatar_uploads: bool,
    pub assistant_api_key: Option<String>,
    pub assistant_model: String,
    pub assistant_timeout: Duration,
    pub allowed_origin: Option<String>,
}

impl Config {
    pub fn from_secrets(secrets: &SecretStore) -> Self {
        Self::from_lookup(|key| secrets.get(key))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| {
            warn!("DATABASE_URL not set");
            String::new()
        });

        Self {
            database_url,
            production: try_load::<String, _>(&lookup, "APP_ENV", "production") == "production",
            public_root: PathBuf::from(try_load::<String, _>(&lookup, "PUBLIC_ROOT", "public")),
            upload_timeout: Duration::from_secs(try_load(&lookup, "UPLOAD_TIMEOUT_SECS", "30")),
            session_ttl_hours: try_load(&lookup, "SESSION_TTL_HOURS", "24"),
            contact_rate: RateLimitConfig::new(
                try_load(&lookup, "CONTACT_RATE_MAX", "10"),
                try_load(&lookup, "CONTACT_RATE_WINDOW_SECS", "60"),
            ),
            api_rate: RateLimitConfig::new(
                try_load(&lookup, "API_RATE_MAX", "30"),
                try_load(&lookup, "API_RATE_WINDOW_SECS", "60"),
            ),
            upload_rate: RateLimitConfig::new(
                try_load(&lookup, "UPLOAD_RATE_MAX", "5"),
                try_load(&lookup, "UPLOAD_RATE_WINDOW_SECS", "60"),
            ),
            avatar_uploads: try_load(&lookup, "AVATAR_UPLOADS_ENABLED", "false"),
            assistant_api_key: lookup("ASSISTANT_API_KEY").filter(|k| !k.trim().is_empty()),
            assistant_model: try_load(&lookup, "ASSISTANT_MODEL", "gemini-pro"),
            assistant_timeout: Duration::from_secs(try_load(
                &lookup,
                "ASSISTANT_TIMEOUT_SECS",
                "30",
            )),
            allowed_origin: lookup("ALLOWED_ORIGIN").filter(|o| !o.trim().is_empty()),
        }
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value: {e}, using default: {default}");
        default
            .parse()
            .unwrap_or_else(|_| panic!("default for {key} must parse"))
    })
}
