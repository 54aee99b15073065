//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;

/// The primary error type for the `api` service. Request-level failures are
/// mapped to HTTP responses in `web::rest`; this covers startup and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_errors_convert_with_context() {
        let err: ApiError = ConfigError::MissingVar("DATABASE_URL".to_string()).into();
        assert!(matches!(err, ApiError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing the environment variable DATABASE_URL"
        );

        let err: ApiError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ApiError::Database(_)));
    }
}
