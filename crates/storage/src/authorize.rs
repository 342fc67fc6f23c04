//! Grant verification and request validation shared by the network backends.

use crate::error::{StorageError, StorageResult};
use stratum_core::{AccessGrant, Action};

/// Verify that a grant's API key was issued by this network.
pub(crate) fn verify_grant(grant: &AccessGrant, root_secret: &[u8]) -> StorageResult<()> {
    if grant.verify(root_secret) {
        Ok(())
    } else {
        Err(StorageError::InvalidAccess(
            "api key failed verification".to_string(),
        ))
    }
}

/// Authorize an object-level action.
pub(crate) fn authorize(
    grant: &AccessGrant,
    action: Action,
    bucket: &str,
    key: &str,
) -> StorageResult<()> {
    if grant.permits(action, bucket, key) {
        Ok(())
    } else {
        tracing::debug!(%action, bucket, key, "request denied by grant");
        Err(StorageError::PermissionDenied {
            action,
            target: format!("sj://{bucket}/{key}"),
        })
    }
}

/// Authorize a bucket-level action.
pub(crate) fn authorize_bucket(
    grant: &AccessGrant,
    action: Action,
    bucket: &str,
) -> StorageResult<()> {
    if grant.permits_bucket(action, bucket) {
        Ok(())
    } else {
        tracing::debug!(%action, bucket, "bucket request denied by grant");
        Err(StorageError::PermissionDenied {
            action,
            target: format!("sj://{bucket}"),
        })
    }
}

/// Validate a bucket name.
///
/// Names are 3-63 characters of lowercase letters, digits, `-` and `.`, and
/// start and end with a letter or digit.
pub fn validate_bucket_name(bucket: &str) -> StorageResult<()> {
    let len = bucket.len();
    if !(3..=63).contains(&len) {
        return Err(StorageError::InvalidBucketName(format!(
            "{bucket:?} must be between 3 and 63 characters"
        )));
    }

    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.';
    if !bucket.chars().all(valid_char) {
        return Err(StorageError::InvalidBucketName(format!(
            "{bucket:?} may only contain lowercase letters, digits, '-' and '.'"
        )));
    }

    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !edge_ok(bucket.chars().next()) || !edge_ok(bucket.chars().last()) {
        return Err(StorageError::InvalidBucketName(format!(
            "{bucket:?} must start and end with a letter or digit"
        )));
    }

    Ok(())
}

/// Validate an object key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}
