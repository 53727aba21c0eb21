//! Error types for pdfjob-sync
//!
//! This module provides the error taxonomy for the library. Transient
//! transport failures are recovered by the next scheduled poll or reconnect
//! and are never fatal; backend-reported job failures travel through
//! [`crate::types::Event`] rather than through this type; download attempt
//! failures are reported as [`crate::types::DownloadOutcome`] values.

use thiserror::Error;

/// Result type alias for pdfjob-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pdfjob-sync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// Network error (connection failure, timeout, malformed response body)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend answered with a non-success HTTP status
    #[error("backend returned status {status}: {message}")]
    Backend {
        /// HTTP status code returned by the backend
        status: u16,
        /// Response body, if any
        message: String,
    },

    /// Requested output artifact does not exist on the backend (yet)
    #[error("file not found on backend: {0}")]
    FileMissing(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Submission refused while the backend reports itself unhealthy
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Folder watching error
    #[error("folder watch error: {0}")]
    WatchFolder(String),

    /// Shutdown in progress - not accepting new submissions
    #[error("shutdown in progress: not accepting new submissions")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}
