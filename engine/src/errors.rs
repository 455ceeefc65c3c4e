//! Error types for the fleetpatch engine

use thiserror::Error;

/// Main error type for the operation engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("OS detection failed: {0}")]
    DetectionFailed(String),

    #[error("Unsupported target: {0}")]
    UnsupportedTarget(String),

    #[error("Command failed with exit code {code}: {detail}")]
    CommandFailed { code: i32, detail: String },

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::StorageError(err.to_string())
    }
}
