//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        CannedReplyAdapter, DbAdapter, EmulatorTokenVerifier, GeminiChatAdapter, InMemoryDb,
        OidcTokenVerifier, ProviderSettings, TracingSmsSender, WebhookSmsSender,
    },
    config::Config,
    error::ApiError,
    web::{api_router, rest::ApiDoc, AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::Router;
use exit_core::ports::{DatabaseService, FederatedTokenVerifier, GenerativeTextService, SmsSender};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set. Using the in-memory store; data is lost on exit.");
            Arc::new(InMemoryDb::new())
        }
    };

    // --- 3. Initialize Service Adapters ---
    let chat_adapter: Arc<dyn GenerativeTextService> = match &config.gemini_api_key {
        Some(api_key) => {
            let client = GeminiChatAdapter::client_for(api_key, &config.gemini_base_url);
            info!("Chat companion using model {}", config.chat_model);
            Arc::new(GeminiChatAdapter::new(client, config.chat_model.clone()))
        }
        None => {
            warn!("GEMINI_API_KEY is not set. The chat companion will use canned replies.");
            Arc::new(CannedReplyAdapter::new())
        }
    };

    let http = reqwest::Client::new();

    let sms_sender: Option<Arc<dyn SmsSender>> = if config.use_auth_emulator {
        info!("Auth emulator enabled: SMS codes are written to the log.");
        Some(Arc::new(TracingSmsSender))
    } else if let Some(url) = &config.sms_webhook_url {
        Some(Arc::new(WebhookSmsSender::new(http.clone(), url.clone())))
    } else {
        warn!("No SMS delivery configured. Phone sign-in is disabled.");
        None
    };

    let federated_verifier: Arc<dyn FederatedTokenVerifier> = if config.use_auth_emulator {
        warn!("Auth emulator enabled: federated ID tokens are NOT signature-checked.");
        Arc::new(EmulatorTokenVerifier)
    } else {
        Arc::new(OidcTokenVerifier::new(
            http,
            ProviderSettings::google(config.project.google_client_id.clone()),
            ProviderSettings::apple(config.project.apple_client_id.clone()),
        ))
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db,
        config: config.clone(),
        chat_adapter,
        sms_sender,
        federated_verifier,
    });

    // --- 5. Create the Web Router ---
    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-device-id"),
        ]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!(
        "Project {} listening on {}",
        config.project.project_id, config.bind_address
    );
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
