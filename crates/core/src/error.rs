//! Error types for the credential core.

use thiserror::Error;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid access grant: {0}")]
    InvalidCredential(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("restriction rejected: {0}")]
    Restriction(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
