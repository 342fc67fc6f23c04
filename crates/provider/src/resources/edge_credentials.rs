//! `storj_edge_credentials`: register a grant with the auth service.

use super::{OperationResult, Resource, credential_error, decode_config};
use crate::context::OperationContext;
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::schema::{AttributeSchema, Schema};
use crate::state::ResourceState;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use stratum_core::{AccessGrant, ResourceId};
use stratum_edge::{AuthServiceClient, EdgeError, RegisterAccessOptions};
use tracing::instrument;

pub static EDGE_CREDENTIALS_SCHEMA: Schema = Schema {
    type_name: "storj_edge_credentials",
    description: "S3-compatible credentials registered for an access grant.",
    attributes: &[
        AttributeSchema::required("access_grant", "The access grant to register.").sensitive(),
        AttributeSchema::optional(
            "allow_public_access",
            "Whether objects can be read without authentication.",
        ),
        AttributeSchema::optional(
            "auth_service_address",
            "The auth service to register with. Defaults to the provider's auth service.",
        ),
        AttributeSchema::computed("access_key_id", "The issued access key id.").sensitive(),
        AttributeSchema::computed("secret_key", "The issued secret key.").sensitive(),
        AttributeSchema::computed("endpoint", "The gateway URL."),
    ],
};

#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeCredentialsConfig {
    pub access_grant: String,
    #[serde(default)]
    pub allow_public_access: bool,
    #[serde(default)]
    pub auth_service_address: Option<String>,
}

impl fmt::Debug for EdgeCredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeCredentialsConfig")
            .field("access_grant", &"[REDACTED]")
            .field("allow_public_access", &self.allow_public_access)
            .field("auth_service_address", &self.auth_service_address)
            .finish()
    }
}

fn registration_error(summary: &str, err: EdgeError) -> Diagnostics {
    let kind = match err {
        EdgeError::InvalidAddress { .. } => ErrorKind::Validation,
        _ => ErrorKind::Registration,
    };
    Diagnostics::error(kind, summary, err)
}

pub struct EdgeCredentialsResource;

#[async_trait]
impl Resource for EdgeCredentialsResource {
    fn schema(&self) -> &'static Schema {
        &EDGE_CREDENTIALS_SCHEMA
    }

    #[instrument(skip_all, fields(resource = "storj_edge_credentials"))]
    async fn create(&self, ctx: &OperationContext, config: &Value) -> OperationResult {
        let config: EdgeCredentialsConfig = decode_config(self.type_name(), config)?;

        let grant = AccessGrant::parse(&config.access_grant)
            .map_err(|e| credential_error("Failed to parse provided access grant", e))?;

        let address = config
            .auth_service_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(ctx.auth_service_address());
        let client = AuthServiceClient::new(address)
            .map_err(|e| registration_error("Invalid auth service address", e))?;

        let options = RegisterAccessOptions {
            public: config.allow_public_access,
        };
        let credentials = ctx
            .run(
                ErrorKind::Registration,
                "Failed to create edge credentials",
                client.register(&grant, options),
            )
            .await?;

        let id = ResourceId::for_edge_credentials(
            &config.access_grant,
            &credentials.endpoint,
            &credentials.access_key_id,
            &credentials.secret_key,
        );
        tracing::info!(id = %id, endpoint = %credentials.endpoint, "edge credentials registered");

        Ok(EDGE_CREDENTIALS_SCHEMA
            .state(id.to_base64())
            .set("access_grant", config.access_grant.as_str())
            .set("allow_public_access", config.allow_public_access)
            .set(
                "auth_service_address",
                config.auth_service_address.clone().map_or(Value::Null, Value::String),
            )
            .set("access_key_id", credentials.access_key_id)
            .set("secret_key", credentials.secret_key)
            .set("endpoint", credentials.endpoint)
            .build())
    }

    /// Issued keys cannot be fetched back from the auth service; the state is
    /// reported unchanged.
    async fn read(&self, _ctx: &OperationContext, state: &ResourceState) -> OperationResult {
        Ok(state.clone())
    }

    /// The auth service has no revocation call.
    async fn delete(&self, _ctx: &OperationContext, _state: &ResourceState) -> Result<(), Diagnostics> {
        Ok(())
    }
}
