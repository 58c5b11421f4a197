//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use serde::Deserialize;
use std::net::SocketAddr;
use tracing::Level;

/// Placeholder value shipped in sample `.env` files.
const GEMINI_KEY_PLACEHOLDER: &str = "your_gemini_api_key_here";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Backend project credentials, supplied as one JSON blob in `PROJECT_CONFIG`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProjectConfig {
    pub project_id: String,
    /// OAuth client id that Google ID tokens must be issued for.
    #[serde(default)]
    pub google_client_id: Option<String>,
    /// Services id that Apple ID tokens must be issued for.
    #[serde(default)]
    pub apple_client_id: Option<String>,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub cors_origin: String,
    pub project: ProjectConfig,
    /// Routes auth through local emulation: unsigned federated tokens are
    /// accepted and SMS codes are written to the log.
    pub use_auth_emulator: bool,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub chat_model: String,
    pub sms_webhook_url: Option<String>,
    pub session_ttl_days: i64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Project Credentials ---
        let project_json = std::env::var("PROJECT_CONFIG")
            .map_err(|_| ConfigError::MissingVar("PROJECT_CONFIG".to_string()))?;
        let project = parse_project_config(&project_json)?;

        let use_auth_emulator = match std::env::var("USE_AUTH_EMULATOR") {
            Ok(raw) => parse_flag("USE_AUTH_EMULATOR", &raw)?,
            Err(_) => false,
        };

        // --- Load Generative API Settings ---
        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty() && key != GEMINI_KEY_PLACEHOLDER);
        let gemini_base_url = std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| {
            "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
        });
        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());

        let sms_webhook_url = std::env::var("SMS_WEBHOOK_URL").ok();

        let session_ttl_days = match std::env::var("SESSION_TTL_DAYS") {
            Ok(raw) => raw.parse::<i64>().ok().filter(|days| *days > 0).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SESSION_TTL_DAYS".to_string(),
                    format!("'{}' is not a positive number of days", raw),
                )
            })?,
            Err(_) => 30,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            project,
            use_auth_emulator,
            gemini_api_key,
            gemini_base_url,
            chat_model,
            sms_webhook_url,
            session_ttl_days,
        })
    }
}

fn parse_project_config(raw: &str) -> Result<ProjectConfig, ConfigError> {
    serde_json::from_str(raw)
        .map_err(|e| ConfigError::InvalidValue("PROJECT_CONFIG".to_string(), e.to_string()))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}
