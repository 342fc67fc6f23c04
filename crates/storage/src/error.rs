//! Storage error types.

use stratum_core::Action;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("permission denied: {action} on {target}")]
    PermissionDenied { action: Action, target: String },

    #[error("invalid access grant: {0}")]
    InvalidAccess(String),

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("project is closed")]
    ProjectClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// True for errors caused by a grant lacking a capability.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
