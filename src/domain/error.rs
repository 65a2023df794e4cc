//! Domain-level error types for backup-chat-exporter.
//!
//! All errors are typed with `thiserror` and provide meaningful context
//! without exposing internal details to end users.

use std::path::PathBuf;
use thiserror::Error;

/// Application-level errors covering the whole export pipeline.
#[derive(Error, Debug)]
pub enum AppError {
    /// Backup manifest database absent or unreadable.
    #[error("Backup manifest could not be loaded from {path}: {message}")]
    ManifestLoad {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Messages database absent, unreadable, or with an unexpected schema.
    #[error("Messages database could not be loaded: {message}")]
    StoreLoad {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON serialization failed.
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a manifest load error from an underlying rusqlite error.
    pub fn manifest_load(path: impl Into<PathBuf>, err: rusqlite::Error) -> Self {
        Self::ManifestLoad {
            path: path.into(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a store load error from an underlying rusqlite error.
    pub fn store_load(err: rusqlite::Error) -> Self {
        Self::StoreLoad {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a JSON error.
    pub fn json(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
