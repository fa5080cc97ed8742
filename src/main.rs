use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http, web};
use apex_portal::assistant::{CompletionClient, GeminiClient};
use apex_portal::config::Config;
use apex_portal::storage::LocalFileStorage;
use apex_portal::store::PgStore;
use apex_portal::{security, AppState};
use shuttle_actix_web::ShuttleActixWeb;
use shuttle_runtime::{CustomError, SecretStore};
use sqlx::postgres::PgPoolOptions;

#[shuttle_runtime::main]
async fn actix_web(
    #[shuttle_runtime::Secrets] secrets: SecretStore,
) -> ShuttleActixWeb<impl FnOnce(&mut web::ServiceConfig) + Send + Clone + 'static> {
    let config = Config::from_secrets(&secrets);
    security::set_error_detail(!config.production);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(CustomError::new)?;

    let store = PgStore::new(pool);
    store.migrate().await.map_err(CustomError::new)?;
    tracing::info!("✅ Database ready");

    let assistant: Option<Arc<dyn CompletionClient>> = match &config.assistant_api_key {
        Some(key) => match GeminiClient::new(
            key.clone(),
            config.assistant_model.clone(),
            config.assistant_timeout,
        ) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Assistant disabled: {e}");
                None
            }
        },
        None => {
            tracing::info!("ASSISTANT_API_KEY not set, chat is disabled");
            None
        }
    };

    let files = LocalFileStorage::new(&config.public_root, config.upload_timeout);
    let allowed_origin = config.allowed_origin.clone();
    let state = AppState::new(config, Arc::new(store), Arc::new(files), assistant);

    let app = move |cfg: &mut web::ServiceConfig| {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        }
        .allowed_methods(vec!["GET", "POST", "PATCH", "OPTIONS"])
        .allowed_headers(vec![
            http::header::CONTENT_TYPE,
            http::header::AUTHORIZATION,
            http::header::ACCEPT,
        ])
        .expose_headers(vec![http::header::RETRY_AFTER])
        .max_age(3600);

        cfg.service(
            web::scope("")
                .wrap(cors)
                .configure(|scope| apex_portal::configure(scope, &state)),
        );
    };

    Ok(app.into())
}
