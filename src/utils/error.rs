//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use ops_reasoner_core::{CollectorError, CoreError};
use ops_reasoner_llm::LlmError;
use thiserror::Error;

use crate::services::history::BackendError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors raised by the core crate (state transitions, thresholds)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Telemetry collector errors
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Chat-history backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A reasoning phase body failed
    #[error("{phase} phase failed: {message}")]
    Phase { phase: String, message: String },

    /// The surrounding request was cancelled
    #[error("Session cancelled")]
    Cancelled,

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a phase error
    pub fn phase(phase: impl ToString, msg: impl Into<String>) -> Self {
        Self::Phase {
            phase: phase.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error means the caller cannot proceed before the
    /// pipeline even starts.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::Backend(BackendError::MissingCredentials(_))
                | AppError::Backend(BackendError::Unauthorized)
                | AppError::Backend(BackendError::ServiceNotFound(_))
        )
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ops_reasoner_core::ReasoningPhase;

    #[test]
    fn test_phase_error_display() {
        let err = AppError::phase(ReasoningPhase::Execution, "collector panicked");
        assert_eq!(err.to_string(), "execution phase failed: collector panicked");
    }

    #[test]
    fn test_error_conversion() {
        let err = AppError::config("missing api key");
        let msg: String = err.into();
        assert!(msg.contains("Configuration error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_fatal_setup_classification() {
        let missing: AppError = BackendError::MissingCredentials("svc-1".into()).into();
        assert!(missing.is_fatal_setup());
        assert!(!AppError::Cancelled.is_fatal_setup());
        assert!(!AppError::phase("planning", "boom").is_fatal_setup());
    }
}
