//! Error types for the scheduler

use chrono::NaiveDateTime;
use thiserror::Error;

/// Result type alias for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur in the event loop, event sources and scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A daily rule could not be parsed
    #[error("Invalid time expression: {0}")]
    InvalidTimeExpression(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// `run` was called while the loop was already running
    #[error("Event loop is already running")]
    AlreadyRunning,

    /// A loop callback failed; the loop stopped and will not resume
    #[error("Callback due at {due} failed: {error:#}")]
    CallbackFailed { due: NaiveDateTime, error: anyhow::Error },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML decoding errors
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML encoding errors
    #[error("TOML encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl SchedulerError {
    /// Create a new time expression error
    pub fn time_expression(msg: impl Into<String>) -> Self {
        Self::InvalidTimeExpression(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error came out of a loop callback
    pub fn is_callback_failure(&self) -> bool {
        matches!(self, Self::CallbackFailed { .. })
    }
}
