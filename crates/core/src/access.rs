//! Access grants and their serialized form.
//!
//! An access grant bundles three things:
//! - the address of the satellite that owns the project metadata
//! - an API key: a macaroon whose caveats narrow what the key may do
//! - the encryption key used for object content
//!
//! The serialized form is `base64url(version || json(payload) || checksum)`,
//! where the checksum is the first four bytes of SHA-256 over the version byte
//! and payload. Parsing rejects anything that fails the checksum.

use crate::error::{Error, Result};
use crate::permission::{Action, Permission, SharePrefix};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Current serialization format version.
pub const ACCESS_GRANT_VERSION: u8 = 1;

/// Length of the trailing checksum in bytes.
const CHECKSUM_LEN: usize = 4;

/// Length of macaroon head, tail and encryption key in bytes.
const KEY_LEN: usize = 32;

/// A restriction layered onto an API key.
///
/// A caveat allows an operation when its permission holds the action and,
/// if it lists any paths, the target falls inside at least one of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Caveat {
    pub permission: Permission,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_paths: Vec<SharePrefix>,
}

impl Caveat {
    /// Check an object-level operation.
    pub fn allows(&self, action: Action, bucket: &str, key: &str) -> bool {
        self.permission.allows(action)
            && (self.allowed_paths.is_empty()
                || self.allowed_paths.iter().any(|p| p.contains(bucket, key)))
    }

    /// Check a bucket-level operation. Any shared prefix in the bucket counts.
    pub fn allows_bucket(&self, action: Action, bucket: &str) -> bool {
        self.permission.allows(action)
            && (self.allowed_paths.is_empty()
                || self.allowed_paths.iter().any(|p| p.bucket == bucket))
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// A macaroon-style API key.
///
/// `tail` is an HMAC chain: the root tail is `HMAC(root_secret, head)` and
/// each caveat advances it with `HMAC(tail, caveat)`. Holders can add caveats
/// but cannot remove them without the root secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    head: [u8; KEY_LEN],
    caveats: Vec<Caveat>,
    tail: [u8; KEY_LEN],
}

impl ApiKey {
    /// Issue an unrestricted key from a root secret.
    pub fn issue(root_secret: &[u8]) -> Result<Self> {
        if root_secret.is_empty() {
            return Err(Error::Validation("root secret must not be empty".to_string()));
        }
        let mut head = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut head);
        let tail = sign(root_secret, &head);
        Ok(Self {
            head,
            caveats: Vec::new(),
            tail,
        })
    }

    /// Return a new key with one more caveat.
    pub fn restrict(&self, caveat: Caveat) -> Result<Self> {
        let tail = sign(&self.tail, &caveat.to_bytes()?);
        let mut caveats = self.caveats.clone();
        caveats.push(caveat);
        Ok(Self {
            head: self.head,
            caveats,
            tail,
        })
    }

    /// Recompute the HMAC chain with the root secret and compare tails.
    pub fn verify(&self, root_secret: &[u8]) -> bool {
        let mut key = root_secret.to_vec();
        let mut message = self.head.to_vec();
        for caveat in &self.caveats {
            key = sign(&key, &message).to_vec();
            message = match caveat.to_bytes() {
                Ok(bytes) => bytes,
                Err(_) => return false,
            };
        }
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(&key) else {
            return false;
        };
        mac.update(&message);
        mac.verify_slice(&self.tail).is_ok()
    }

    /// Caveats in the order they were added.
    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("caveats", &self.caveats.len())
            .field("tail", &"[REDACTED]")
            .finish()
    }
}

fn sign(key: &[u8], data: &[u8]) -> [u8; KEY_LEN] {
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Key for object content encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// A parsed access grant.
///
/// Grants are immutable values. [`AccessGrant::share`] derives a new grant
/// and leaves the original untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub(crate) satellite_address: String,
    pub(crate) api_key: ApiKey,
    pub(crate) encryption_key: EncryptionKey,
}

impl AccessGrant {
    /// Mint an unrestricted grant for a satellite.
    pub fn issue(
        satellite_address: impl Into<String>,
        root_secret: &[u8],
        encryption_key: EncryptionKey,
    ) -> Result<Self> {
        let satellite_address = satellite_address.into();
        if satellite_address.is_empty() {
            return Err(Error::Validation(
                "satellite address must not be empty".to_string(),
            ));
        }
        Ok(Self {
            satellite_address,
            api_key: ApiKey::issue(root_secret)?,
            encryption_key,
        })
    }

    /// Parse a serialized access grant.
    pub fn parse(serialized: &str) -> Result<Self> {
        let serialized = serialized.trim();
        if serialized.is_empty() {
            return Err(Error::InvalidCredential("access grant is empty".to_string()));
        }

        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(serialized)
            .map_err(|e| Error::InvalidCredential(format!("invalid encoding: {e}")))?;

        if raw.len() <= 1 + CHECKSUM_LEN {
            return Err(Error::InvalidCredential(format!(
                "too short: {} bytes",
                raw.len()
            )));
        }

        let (body, checksum) = raw.split_at(raw.len() - CHECKSUM_LEN);
        if checksum != compute_checksum(body) {
            return Err(Error::InvalidCredential("checksum mismatch".to_string()));
        }

        let version = body[0];
        if version != ACCESS_GRANT_VERSION {
            return Err(Error::InvalidCredential(format!(
                "unsupported version: {version} (expected {ACCESS_GRANT_VERSION})"
            )));
        }

        let payload: GrantPayload = serde_json::from_slice(&body[1..])
            .map_err(|e| Error::InvalidCredential(format!("malformed payload: {e}")))?;

        payload.into_grant()
    }

    /// Serialize to the opaque wire form.
    pub fn serialize(&self) -> Result<String> {
        let payload = GrantPayload::from_grant(self);
        let json =
            serde_json::to_vec(&payload).map_err(|e| Error::Serialization(e.to_string()))?;

        let mut raw = Vec::with_capacity(1 + json.len() + CHECKSUM_LEN);
        raw.push(ACCESS_GRANT_VERSION);
        raw.extend_from_slice(&json);
        let checksum = compute_checksum(&raw);
        raw.extend_from_slice(&checksum);

        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw))
    }

    /// Address of the satellite responsible for this grant's project.
    pub fn satellite_address(&self) -> &str {
        &self.satellite_address
    }

    /// The grant's encryption key.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// Permissions held after applying every caveat.
    pub fn effective_permission(&self) -> Permission {
        self.api_key
            .caveats
            .iter()
            .fold(Permission::full(), |held, caveat| {
                held.intersect(&caveat.permission)
            })
    }

    /// Path restrictions the grant carries, one set per scoped caveat.
    ///
    /// A target must fall inside at least one prefix of every set.
    pub fn scope_restrictions(&self) -> impl Iterator<Item = &[SharePrefix]> {
        self.api_key
            .caveats
            .iter()
            .filter(|c| !c.allowed_paths.is_empty())
            .map(|c| c.allowed_paths.as_slice())
    }

    /// Check whether the grant authorizes an object-level action.
    pub fn permits(&self, action: Action, bucket: &str, key: &str) -> bool {
        self.api_key
            .caveats
            .iter()
            .all(|c| c.allows(action, bucket, key))
    }

    /// Check whether the grant authorizes a bucket-level action.
    pub fn permits_bucket(&self, action: Action, bucket: &str) -> bool {
        self.api_key
            .caveats
            .iter()
            .all(|c| c.allows_bucket(action, bucket))
    }

    /// Verify the API key was issued with `root_secret`.
    pub fn verify(&self, root_secret: &[u8]) -> bool {
        self.api_key.verify(root_secret)
    }
}

impl fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGrant")
            .field("satellite_address", &self.satellite_address)
            .field("permission", &self.effective_permission())
            .field("caveats", &self.api_key.caveats.len())
            .finish()
    }
}

fn compute_checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(data);
    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&digest[..CHECKSUM_LEN]);
    checksum
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GrantPayload {
    satellite_address: String,
    api_key: ApiKeyPayload,
    #[serde(with = "b64")]
    encryption_key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApiKeyPayload {
    #[serde(with = "b64")]
    head: Vec<u8>,
    #[serde(default)]
    caveats: Vec<Caveat>,
    #[serde(with = "b64")]
    tail: Vec<u8>,
}

impl GrantPayload {
    fn from_grant(grant: &AccessGrant) -> Self {
        Self {
            satellite_address: grant.satellite_address.clone(),
            api_key: ApiKeyPayload {
                head: grant.api_key.head.to_vec(),
                caveats: grant.api_key.caveats.clone(),
                tail: grant.api_key.tail.to_vec(),
            },
            encryption_key: grant.encryption_key.0.to_vec(),
        }
    }

    fn into_grant(self) -> Result<AccessGrant> {
        if self.satellite_address.is_empty() {
            return Err(Error::InvalidCredential(
                "missing satellite address".to_string(),
            ));
        }
        if self
            .api_key
            .caveats
            .iter()
            .flat_map(|c| c.allowed_paths.iter())
            .any(|p| p.bucket.is_empty())
        {
            return Err(Error::InvalidCredential(
                "caveat shares an empty bucket name".to_string(),
            ));
        }
        Ok(AccessGrant {
            satellite_address: self.satellite_address,
            api_key: ApiKey {
                head: fixed("api key head", self.api_key.head)?,
                caveats: self.api_key.caveats,
                tail: fixed("api key tail", self.api_key.tail)?,
            },
            encryption_key: EncryptionKey(fixed("encryption key", self.encryption_key)?),
        })
    }
}

fn fixed(field: &str, bytes: Vec<u8>) -> Result<[u8; KEY_LEN]> {
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        Error::InvalidCredential(format!("{field}: expected {KEY_LEN} bytes, got {len}"))
    })
}

// Binary fields are standard base64 inside the JSON payload.
mod b64 {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        general_purpose::STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_SECRET: &[u8] = b"satellite-root-secret";

    fn root_grant() -> AccessGrant {
        AccessGrant::issue(
            "us1.storj.io:7777",
            ROOT_SECRET,
            EncryptionKey::from_bytes([7u8; 32]),
        )
        .unwrap()
    }

    #[test]
    fn test_serialize_parse_roundtrip() {
        let grant = root_grant();
        let serialized = grant.serialize().unwrap();
        let parsed = AccessGrant::parse(&serialized).unwrap();

        assert_eq!(parsed, grant);
        assert_eq!(parsed.serialize().unwrap(), serialized);
        assert_eq!(parsed.effective_permission(), Permission::full());
        assert!(parsed.verify(ROOT_SECRET));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            AccessGrant::parse(""),
            Err(Error::InvalidCredential(_))
        ));
        assert!(matches!(
            AccessGrant::parse("   "),
            Err(Error::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AccessGrant::parse("not a grant!").is_err());
        assert!(AccessGrant::parse("AAAA").is_err());
    }

    #[test]
    fn test_parse_rejects_checksum_mismatch() {
        let serialized = root_grant().serialize().unwrap();
        let mut raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&serialized)
            .unwrap();
        // Flip a byte inside the payload.
        raw[10] ^= 0x01;
        let tampered = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw);

        match AccessGrant::parse(&tampered) {
            Err(Error::InvalidCredential(msg)) => assert!(msg.contains("checksum")),
            other => panic!("expected checksum failure, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_version() {
        let serialized = root_grant().serialize().unwrap();
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&serialized)
            .unwrap();
        let mut body = raw[..raw.len() - CHECKSUM_LEN].to_vec();
        body[0] = 9;
        let checksum = compute_checksum(&body);
        body.extend_from_slice(&checksum);
        let reencoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(body);

        match AccessGrant::parse(&reencoded) {
            Err(Error::InvalidCredential(msg)) => assert!(msg.contains("unsupported version")),
            other => panic!("expected version failure, got {other:?}"),
        }
    }

    #[test]
    fn test_issue_requires_address_and_secret() {
        assert!(AccessGrant::issue("", ROOT_SECRET, EncryptionKey::generate()).is_err());
        assert!(AccessGrant::issue("sat:7777", b"", EncryptionKey::generate()).is_err());
    }

    #[test]
    fn test_verify_detects_removed_caveat() {
        let grant = root_grant();
        let restricted = grant
            .api_key
            .restrict(Caveat {
                permission: Permission::read_only(),
                allowed_paths: Vec::new(),
            })
            .unwrap();
        assert!(restricted.verify(ROOT_SECRET));

        // Dropping the caveat without recomputing the tail breaks the chain.
        let stripped = ApiKey {
            head: restricted.head,
            caveats: Vec::new(),
            tail: restricted.tail,
        };
        assert!(!stripped.verify(ROOT_SECRET));
        assert!(!restricted.verify(b"some-other-secret"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let grant = root_grant();
        let debug = format!("{grant:?} {:?}", grant.encryption_key());
        assert!(debug.contains("us1.storj.io:7777"));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&grant.serialize().unwrap()));
    }
}
