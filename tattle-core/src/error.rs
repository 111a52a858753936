//! Error types for tattle-core

use thiserror::Error;

/// Main error type for the tattle-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Checkpoint persistence error
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

/// Result type alias for tattle-core
pub type Result<T> = std::result::Result<T, Error>;
