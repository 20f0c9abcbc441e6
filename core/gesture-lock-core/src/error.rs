//! Error types for gesture-lock-core operations.

use std::path::PathBuf;

/// All errors that can occur in gesture-lock-core operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Environment Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Event source unavailable: {0}")]
    EventSourceUnavailable(String),

    #[error("Monitor is not running")]
    MonitorStopped,

    // ─────────────────────────────────────────────────────────────────────
    // Template Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid gesture: {0}")]
    InvalidGesture(String),

    #[error("Template storage failed for {package}: {details}")]
    TemplateStorage { package: String, details: String },

    #[error("Store lock poisoned: {0}")]
    Poisoned(&'static str),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using LockError.
pub type Result<T> = std::result::Result<T, LockError>;

impl From<LockError> for String {
    fn from(err: LockError) -> String {
        err.to_string()
    }
}
