pub mod analytics;
pub mod assistant;
pub mod attendance;
pub mod auth;
pub mod config;
pub mod contact;
pub mod error;
pub mod messages;
pub mod notifications;
pub mod progress;
pub mod security;
pub mod storage;
pub mod store;
pub mod submissions;
pub mod tasks;
pub mod upload;

use std::sync::Arc;

use actix_web::web;

use crate::assistant::CompletionClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::security::rate_limit::RateLimits;
use crate::security::MAX_BODY_BYTES;
use crate::storage::FileStorage;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub files: Arc<dyn FileStorage>,
    pub limits: Arc<RateLimits>,
    pub assistant: Option<Arc<dyn CompletionClient>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        files: Arc<dyn FileStorage>,
        assistant: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        let limits = RateLimits::new(
            config.contact_rate.clone(),
            config.api_rate.clone(),
            config.upload_rate.clone(),
        );
        Self {
            store,
            files,
            limits: Arc::new(limits),
            assistant,
            config: Arc::new(config),
        }
    }
}

/// Registers shared state and every route. Optional capabilities are
/// resolved here, once, from configuration.
pub fn configure(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.app_data(web::Data::new(state.clone()))
        .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
        .app_data(
            web::QueryConfig::default()
                .error_handler(|_, _| ApiError::bad_request("Invalid query parameters").into()),
        )
        .app_data(
            web::PathConfig::default()
                .error_handler(|_, _| ApiError::bad_request("Invalid path parameters").into()),
        )
        .configure(auth::routes::config)
        .configure(submissions::routes::config)
        .configure(tasks::routes::config)
        .configure(notifications::routes::config)
        .configure(messages::routes::config)
        .configure(progress::routes::config)
        .configure(attendance::routes::config)
        .configure(contact::routes::config)
        .configure(assistant::routes::config)
        .configure(analytics::routes::config);

    if state.config.avatar_uploads {
        cfg.configure(upload::routes::config);
    } else {
        tracing::info!("Avatar uploads disabled");
    }

    cfg.service(actix_files::Files::new(
        "/uploads",
        state.config.public_root.join("uploads"),
    ));
}
