//! The configured provider: resource registry plus shared connection state.

use crate::context::OperationContext;
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::resources::access_grant::AccessGrantResource;
use crate::resources::bucket::{BucketDataSource, BucketResource};
use crate::resources::edge_credentials::EdgeCredentialsResource;
use crate::resources::object::{ObjectDataSource, ObjectResource, ObjectsDataSource};
use crate::resources::{DataSource, OperationResult, Resource, update_not_supported};
use crate::state::ResourceState;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratum_core::{AccessGrant, ProviderConfig};
use stratum_storage::Network;
use tokio_util::sync::CancellationToken;

/// Registered resource kinds and data sources, keyed by type name.
pub struct Registry {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl Registry {
    fn new() -> Self {
        let mut registry = Self {
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
        };
        registry.add_resource(Arc::new(BucketResource));
        registry.add_resource(Arc::new(ObjectResource));
        registry.add_resource(Arc::new(AccessGrantResource));
        registry.add_resource(Arc::new(EdgeCredentialsResource));
        registry.add_data_source(Arc::new(BucketDataSource));
        registry.add_data_source(Arc::new(ObjectDataSource));
        registry.add_data_source(Arc::new(ObjectsDataSource));
        registry
    }

    fn add_resource(&mut self, resource: Arc<dyn Resource>) {
        self.resources.insert(resource.type_name(), resource);
    }

    fn add_data_source(&mut self, data_source: Arc<dyn DataSource>) {
        self.data_sources.insert(data_source.type_name(), data_source);
    }
}

/// A provider bound to one root grant and one storage network.
pub struct Provider {
    grant: AccessGrant,
    auth_service_address: String,
    network: Arc<dyn Network>,
    registry: Registry,
}

impl Provider {
    /// Validate the configuration, parse the root grant and connect the
    /// configured storage network.
    pub async fn configure(config: ProviderConfig) -> Result<Self, Diagnostics> {
        config.validate().map_err(|e| {
            Diagnostics::error(ErrorKind::Validation, "Invalid provider configuration", e)
        })?;
        let network = stratum_storage::from_config(&config.network)
            .await
            .map_err(|e| Diagnostics::error(ErrorKind::Storage, "Failed to open storage network", e))?;
        Self::with_network(config, network)
    }

    /// Build a provider over an already constructed network.
    pub fn with_network(config: ProviderConfig, network: Arc<dyn Network>) -> Result<Self, Diagnostics> {
        let grant = AccessGrant::parse(&config.access_grant).map_err(|e| {
            Diagnostics::error(ErrorKind::Credential, "Failed to parse access grant", e)
        })?;
        tracing::debug!(
            backend = network.backend_name(),
            auth_service = %config.auth_service_address,
            "provider configured"
        );
        Ok(Self {
            grant,
            auth_service_address: config.auth_service_address,
            network,
            registry: Registry::new(),
        })
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.registry.resources.keys().copied()
    }

    pub fn data_source_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.registry.data_sources.keys().copied()
    }

    pub fn resource(&self, type_name: &str) -> Result<Arc<dyn Resource>, Diagnostics> {
        self.registry
            .resources
            .get(type_name)
            .cloned()
            .ok_or_else(|| unknown_type("resource", type_name))
    }

    pub fn data_source(&self, type_name: &str) -> Result<Arc<dyn DataSource>, Diagnostics> {
        self.registry
            .data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| unknown_type("data source", type_name))
    }

    /// A context for one operation that is never cancelled.
    pub fn context(&self) -> OperationContext {
        self.context_with_cancellation(CancellationToken::new())
    }

    pub fn context_with_cancellation(&self, cancel: CancellationToken) -> OperationContext {
        OperationContext::new(
            self.network.clone(),
            self.grant.clone(),
            self.auth_service_address.clone(),
            cancel,
        )
    }

    pub async fn create(&self, type_name: &str, config: &Value) -> OperationResult {
        self.resource(type_name)?.create(&self.context(), config).await
    }

    pub async fn read(&self, type_name: &str, state: &ResourceState) -> OperationResult {
        self.resource(type_name)?.read(&self.context(), state).await
    }

    pub async fn update(&self, type_name: &str, state: &ResourceState, config: &Value) -> OperationResult {
        let resource = self.resource(type_name)?;
        if !resource.schema().supports_update() {
            return Err(update_not_supported(resource.schema()));
        }
        resource.update(&self.context(), state, config).await
    }

    pub async fn delete(&self, type_name: &str, state: &ResourceState) -> Result<(), Diagnostics> {
        self.resource(type_name)?.delete(&self.context(), state).await
    }

    pub async fn query(&self, type_name: &str, config: &Value) -> OperationResult {
        self.data_source(type_name)?.read(&self.context(), config).await
    }
}

fn unknown_type(what: &str, type_name: &str) -> Diagnostics {
    Diagnostics::error(
        ErrorKind::Validation,
        format!("Unknown {what} type"),
        format!("no {what} named {type_name:?}"),
    )
}
