//! Storage network contract and backends for Stratum.
//!
//! This crate provides:
//! - The `Network` / `Project` / `ObjectUpload` traits the provider talks to
//! - Per-operation authorization against an access grant
//! - Backends: in-memory and local filesystem

mod authorize;
pub mod backends;
pub mod error;
pub mod traits;

pub use authorize::{validate_bucket_name, validate_key};
pub use backends::{filesystem::FilesystemNetwork, memory::MemoryNetwork};
pub use error::{StorageError, StorageResult};
pub use traits::{
    BucketInfo, ByteStream, CustomMetadata, ListObjectsOptions, ListingEntry, Network,
    ObjectInfo, ObjectStream, ObjectUpload, Project, select_listing,
};

use std::sync::Arc;
use stratum_core::NetworkConfig;

/// Create a storage network from configuration.
pub async fn from_config(config: &NetworkConfig) -> StorageResult<Arc<dyn Network>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        NetworkConfig::Filesystem { path, root_secret } => {
            let network = FilesystemNetwork::new(path, root_secret).await?;
            Ok(Arc::new(network))
        }
        NetworkConfig::Memory { root_secret } => Ok(Arc::new(MemoryNetwork::new(root_secret))),
    }
}
