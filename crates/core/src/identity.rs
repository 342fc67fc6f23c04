//! Stable resource identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 digest used as a resource's primary key.
///
/// Rendered as standard padded base64. Identical input always yields the same
/// identifier. The digest is one-way but is not what keeps a credential
/// secret; the credential itself stays sensitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId([u8; 32]);

impl ResourceId {
    /// Create from raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Digest canonical bytes.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Identify a derived access grant by its serialized form.
    pub fn for_access_grant(serialized: &str) -> Self {
        Self::digest(serialized.as_bytes())
    }

    /// Identify an edge credential bundle together with the grant it came from.
    pub fn for_edge_credentials(
        access_grant: &str,
        endpoint: &str,
        access_key_id: &str,
        secret_key: &str,
    ) -> Self {
        let canonical = format!("{access_grant}.{endpoint}.{access_key_id}.{secret_key}");
        Self::digest(canonical.as_bytes())
    }

    /// Encode as base64 string.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.to_base64())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}
