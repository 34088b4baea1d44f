//! Error Handling
//!
//! Unified error type for the synthesis service.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use assertflip_core::CoreError;
use assertflip_llm::LlmError;
use assertflip_runner::ExecutionError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Errors from the core data model
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Oracle errors that survived the retry policy
    #[error("Oracle error: {0}")]
    Llm(#[from] LlmError),

    /// Execution environment errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset loading errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Refusal to overwrite a persisted test
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The run was cancelled before the instance finished
    #[error("Cancelled")]
    Cancelled,

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

    /// Create a dataset error
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an already-exists error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            AppError::AlreadyExists(_) | AppError::Core(CoreError::AlreadyExists(_))
        )
    }
}
