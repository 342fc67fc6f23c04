//! Resource kinds and data sources.

pub mod access_grant;
pub mod bucket;
pub mod edge_credentials;
pub mod object;

use crate::context::OperationContext;
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::schema::Schema;
use crate::state::ResourceState;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Outcome of a resource or data source operation.
pub type OperationResult = Result<ResourceState, Diagnostics>;

/// A managed resource kind.
#[async_trait]
pub trait Resource: Send + Sync {
    fn schema(&self) -> &'static Schema;

    fn type_name(&self) -> &'static str {
        self.schema().type_name
    }

    async fn create(&self, ctx: &OperationContext, config: &Value) -> OperationResult;

    async fn read(&self, ctx: &OperationContext, state: &ResourceState) -> OperationResult;

    /// Update in place. Kinds whose attributes all force replacement reject this.
    async fn update(
        &self,
        _ctx: &OperationContext,
        _state: &ResourceState,
        _config: &Value,
    ) -> OperationResult {
        Err(update_not_supported(self.schema()))
    }

    async fn delete(&self, ctx: &OperationContext, state: &ResourceState) -> Result<(), Diagnostics>;
}

/// Rejection for an update to a kind that must be replaced instead.
pub(crate) fn update_not_supported(schema: &Schema) -> Diagnostics {
    let fields = schema.replacement_attributes().collect::<Vec<_>>().join(", ");
    Diagnostics::error(
        ErrorKind::Validation,
        "Update not supported",
        format!("{} must be replaced to change {fields}", schema.type_name),
    )
}

/// A read-only data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn schema(&self) -> &'static Schema;

    fn type_name(&self) -> &'static str {
        self.schema().type_name
    }

    async fn read(&self, ctx: &OperationContext, config: &Value) -> OperationResult;
}

/// Decode a resource configuration.
pub(crate) fn decode_config<T: DeserializeOwned>(type_name: &str, config: &Value) -> Result<T, Diagnostics> {
    serde_json::from_value(config.clone()).map_err(|e| {
        Diagnostics::error(
            ErrorKind::Validation,
            format!("Invalid {type_name} configuration"),
            e,
        )
    })
}

/// Read a required string attribute back from a prior state.
pub(crate) fn state_str<'a>(state: &'a ResourceState, name: &str) -> Result<&'a str, Diagnostics> {
    state
        .get_str(name)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Diagnostics::error(
                ErrorKind::Validation,
                "Invalid resource state",
                format!("state is missing {name}"),
            )
        })
}

/// Map a credential engine error onto the diagnostic taxonomy.
pub(crate) fn credential_error(summary: &str, err: stratum_core::Error) -> Diagnostics {
    let kind = match err {
        stratum_core::Error::Validation(_) => ErrorKind::Validation,
        _ => ErrorKind::Credential,
    };
    Diagnostics::error(kind, summary, err)
}
