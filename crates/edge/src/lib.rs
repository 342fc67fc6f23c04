//! Edge credential registration for Stratum.
//!
//! Exchanges an access grant with an auth service for S3-compatible
//! credentials (access key id, secret key, gateway endpoint).

pub mod client;
pub mod error;

pub use client::{AuthServiceClient, EdgeCredentials, RegisterAccessOptions};
pub use error::{EdgeError, EdgeResult};
