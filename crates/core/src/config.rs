//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Auth service used for edge credential registration when none is configured.
pub const DEFAULT_AUTH_SERVICE_ADDRESS: &str = "https://auth.storjshare.io";

/// Environment variable holding the provider's root access grant.
pub const ACCESS_GRANT_ENV: &str = "STORJ_ACCESS_GRANT";

/// Provider configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Serialized access grant used for bucket and object operations.
    pub access_grant: String,
    /// Default auth service for edge credentials that do not name one.
    #[serde(default = "default_auth_service_address")]
    pub auth_service_address: String,
    /// Storage network the provider talks to.
    #[serde(default)]
    pub network: NetworkConfig,
}

impl ProviderConfig {
    /// Create a configuration with defaults for everything but the grant.
    pub fn new(access_grant: impl Into<String>, network: NetworkConfig) -> Self {
        Self {
            access_grant: access_grant.into(),
            auth_service_address: default_auth_service_address(),
            network,
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.access_grant.trim().is_empty() {
            return Err(format!(
                "access_grant is required (set it in the config file or {ACCESS_GRANT_ENV})"
            ));
        }
        if self.auth_service_address.trim().is_empty() {
            return Err("auth_service_address must not be empty".to_string());
        }
        self.network.validate()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("access_grant", &"[REDACTED]")
            .field("auth_service_address", &self.auth_service_address)
            .field("network", &self.network)
            .finish()
    }
}

fn default_auth_service_address() -> String {
    DEFAULT_AUTH_SERVICE_ADDRESS.to_string()
}

/// Storage network configuration.
///
/// `root_secret` is the satellite-side secret API keys are verified against.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetworkConfig {
    /// Buckets and objects stored under a local directory.
    Filesystem {
        /// Root directory for buckets.
        path: PathBuf,
        /// Secret used to verify API keys.
        root_secret: String,
    },
    /// Buckets and objects held in process memory.
    Memory {
        /// Secret used to verify API keys.
        root_secret: String,
    },
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/network"),
            root_secret: String::new(),
        }
    }
}

impl NetworkConfig {
    /// The secret API keys are verified against.
    pub fn root_secret(&self) -> &str {
        match self {
            Self::Filesystem { root_secret, .. } | Self::Memory { root_secret } => root_secret,
        }
    }

    /// Validate network configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.root_secret().is_empty() {
            return Err("network root_secret must not be empty".to_string());
        }
        match self {
            Self::Filesystem { path, .. } if path.as_os_str().is_empty() => {
                Err("filesystem network requires a path".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem { path, .. } => f
                .debug_struct("Filesystem")
                .field("path", path)
                .field("root_secret", &"[REDACTED]")
                .finish(),
            Self::Memory { .. } => f
                .debug_struct("Memory")
                .field("root_secret", &"[REDACTED]")
                .finish(),
        }
    }
}
