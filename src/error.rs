//! # Error Types
//!
//! Custom error types for Edge Sentinel using `thiserror`.

use thiserror::Error;

/// Main error type for Edge Sentinel
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Configuration errors (parsing and validation)
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A listening endpoint could not be opened
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A complete record arrived but could not be decoded
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] serde_json::Error),

    /// Log sink could not be installed
    #[error("Logging setup error: {0}")]
    Logging(String),
}

/// Result type alias for Edge Sentinel
pub type Result<T> = std::result::Result<T, EdgeError>;
