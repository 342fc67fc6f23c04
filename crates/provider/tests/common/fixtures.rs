//! Provider fixtures.

use std::sync::Arc;
use stratum_core::{AccessGrant, EncryptionKey, NetworkConfig, ProviderConfig};
use stratum_provider::{Diagnostics, ErrorKind, Provider};
use stratum_storage::{MemoryNetwork, Network};

pub const ROOT_SECRET: &str = "provider-test-root-secret";

/// An unrestricted grant for networks built with [`ROOT_SECRET`].
#[allow(dead_code)]
pub fn root_grant() -> AccessGrant {
    AccessGrant::issue("127.0.0.1:7777", ROOT_SECRET.as_bytes(), EncryptionKey::from_bytes([9; 32]))
        .expect("issue root grant")
}

#[allow(dead_code)]
pub fn root_grant_string() -> String {
    root_grant().serialize().expect("serialize root grant")
}

#[allow(dead_code)]
pub fn memory_config(grant: &str) -> ProviderConfig {
    ProviderConfig::new(
        grant,
        NetworkConfig::Memory {
            root_secret: ROOT_SECRET.to_string(),
        },
    )
}

/// A provider over `network` using the given serialized grant.
#[allow(dead_code)]
pub fn provider_for(grant: &str, network: Arc<dyn Network>) -> Provider {
    Provider::with_network(memory_config(grant), network).expect("configure provider")
}

/// A provider with the root grant over a fresh memory network.
#[allow(dead_code)]
pub fn memory_provider() -> (Provider, MemoryNetwork) {
    let network = MemoryNetwork::new(ROOT_SECRET);
    let provider = provider_for(&root_grant_string(), Arc::new(network.clone()));
    (provider, network)
}

/// Assert the first error's kind and summary.
#[allow(dead_code)]
#[track_caller]
pub fn assert_error(diags: &Diagnostics, kind: ErrorKind, summary: &str) {
    let diag = diags.first_error().expect("an error diagnostic");
    assert_eq!(diag.kind, kind, "{diags}");
    assert_eq!(diag.summary, summary, "{diags}");
}
