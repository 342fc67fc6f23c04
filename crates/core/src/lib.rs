//! Core credential logic for Stratum.
//!
//! This crate defines the pieces every other crate builds on:
//! - Access grant parsing and serialization
//! - Capability restriction (deriving narrower grants)
//! - Stable resource identifiers
//! - Provider configuration

pub mod access;
pub mod config;
pub mod error;
pub mod identity;
pub mod permission;
pub mod share;

pub use access::{AccessGrant, ApiKey, Caveat, EncryptionKey};
pub use config::{DEFAULT_AUTH_SERVICE_ADDRESS, NetworkConfig, ProviderConfig};
pub use error::{Error, Result};
pub use identity::ResourceId;
pub use permission::{Action, Permission, SharePrefix};
