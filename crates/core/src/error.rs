//! Error types for faqroute.
//!
//! A single error enum covers configuration, I/O, LLM transport, prompt
//! rendering, pipeline and backend failures. Most pipeline stages never let
//! these escape: they log them and degrade to a safer path instead.

use thiserror::Error;

/// Unified error type for faqroute.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Routing pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Structured store or semantic index failures
    #[error("Backend error: {0}")]
    Backend(String),

    /// The caller sent a request that cannot be answered
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An external call did not finish in time
    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the error was caused by the caller rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::InvalidRequest(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
