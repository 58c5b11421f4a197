//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::http::StatusCode;
use exit_core::ports::PortError;
use tracing::{error, warn};

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying migrations at startup.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Maps a port failure onto the HTTP status a handler should answer with.
pub fn port_status(err: &PortError) -> StatusCode {
    match err {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Logs a port failure and turns it into a handler rejection.
///
/// Internal failures are reported to the client as `context` only.
pub fn port_rejection(context: &str, err: PortError) -> (StatusCode, String) {
    let status = port_status(&err);
    if status.is_server_error() {
        error!("{}: {:?}", context, err);
    } else {
        warn!("{}: {:?}", context, err);
    }
    let message = match err {
        PortError::NotFound(msg)
        | PortError::Conflict(msg)
        | PortError::InvalidInput(msg)
        | PortError::Unavailable(msg) => msg,
        PortError::Unauthorized => "Unauthorized".to_string(),
        PortError::Unexpected(_) => context.to_string(),
    };
    (status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_stay_in_the_log() {
        let (status, message) = port_rejection(
            "Failed to load quotes",
            PortError::Unexpected("connection reset by peer".to_string()),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Failed to load quotes");

        let (status, message) =
            port_rejection("Failed to vote", PortError::Conflict("Already voted".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(message, "Already voted");
    }
}
