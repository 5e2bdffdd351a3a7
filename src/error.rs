//! s3fs Error Types

use thiserror::Error;

use crate::storage::PathError;

/// Result type alias for s3fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// s3fs error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Storage errors
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Storage root unavailable at {path}: {reason}")]
    StorageRoot { path: String, reason: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
