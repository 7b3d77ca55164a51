//! Error types for the transfer session manager

use thiserror::Error;

/// Main error type for the transfer session manager
#[derive(Error, Debug)]
pub enum TransferError {
    /// Transfer binary not found or not installed
    #[error("Transfer binary not found: {0}")]
    BinaryNotFound(String),

    /// Malformed request rejected at the API boundary
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid manager configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Staging failed (link, copy or compress)
    #[error("Staging failed: {0}")]
    Staging(String),

    /// Archive could not be written
    #[error("Archive error: {0}")]
    Archive(String),

    /// The transfer binary could not be started
    #[error("Failed to start transfer binary: {0}")]
    Spawn(String),

    /// Transfer session not found
    #[error("Transfer session not found: {0}")]
    SessionNotFound(String),

    /// Session list could not be loaded or saved
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading or writing persisted sessions
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    /// Create a binary not found error
    pub fn binary_not_found(name: &str) -> Self {
        Self::BinaryNotFound(format!(
            "'{name}' was not found in PATH or common install locations.\n\
             Install it, or set `binary_path` in TransferOptions"
        ))
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a staging error
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// Create an archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound(session_id.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

impl From<zip::result::ZipError> for TransferError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<walkdir::Error> for TransferError {
    fn from(err: walkdir::Error) -> Self {
        Self::Staging(err.to_string())
    }
}
