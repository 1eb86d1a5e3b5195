//! Error types for the file gate

use thiserror::Error;
use trade_account::{FailureKind, GateFailure};

/// Result type alias for file gate operations
pub type Result<T> = std::result::Result<T, FileGateError>;

/// Errors that can occur while talking to the broker through files
#[derive(Error, Debug)]
pub enum FileGateError {
    /// I/O errors on broker or state files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Local state (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization errors
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The exclusive lock on a request file was not acquired in time
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// A snapshot file is absent or still being written
    #[error("Incomplete file: {0}")]
    Incomplete(String),

    /// A broker line or row that cannot be understood
    #[error("Malformed {file} record: {message}")]
    Malformed { file: String, message: String },

    /// A security code that has no broker counterpart
    #[error("Unsupported security code: {0}")]
    UnsupportedCode(String),

    /// The gate was used before setup
    #[error("File gate is not set up")]
    NotReady,
}

impl FileGateError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new malformed record error
    pub fn malformed(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed { file: file.into(), message: message.into() }
    }

    /// Create a new incomplete file error
    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::Incomplete(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            FileGateError::NotReady => FailureKind::NotReady,
            FileGateError::LockTimeout(_) => FailureKind::Timeout,
            FileGateError::UnsupportedCode(_) | FileGateError::Config(_) => FailureKind::Invalid,
            FileGateError::Malformed { .. } | FileGateError::Csv(_) => FailureKind::Protocol,
            FileGateError::Io(_)
            | FileGateError::Incomplete(_)
            | FileGateError::Serialization(_)
            | FileGateError::TomlDe(_)
            | FileGateError::TomlSer(_) => FailureKind::Transport,
        }
    }
}

impl From<FileGateError> for GateFailure {
    fn from(err: FileGateError) -> Self {
        GateFailure::new(err.kind(), err.to_string())
    }
}
