//! Registration error types.

use thiserror::Error;

/// Errors from registering an access grant with the auth service.
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("invalid auth service address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to serialize access grant: {0}")]
    Serialize(#[from] stratum_core::Error),

    #[error("auth service unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("auth service rejected registration ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid auth service response: {0}")]
    InvalidResponse(String),
}

/// Result type for registration.
pub type EdgeResult<T> = std::result::Result<T, EdgeError>;
