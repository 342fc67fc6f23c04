//! `storj_access_grant`: derive a narrower grant from a root grant.

use super::{OperationResult, Resource, credential_error, decode_config};
use crate::context::OperationContext;
use crate::diagnostics::Diagnostics;
use crate::schema::{AttributeSchema, Schema};
use crate::state::ResourceState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use stratum_core::{AccessGrant, Permission, ResourceId, SharePrefix};
use tracing::instrument;

pub static ACCESS_GRANT_SCHEMA: Schema = Schema {
    type_name: "storj_access_grant",
    description: "An access grant derived from a root grant with narrower permissions and scope.",
    attributes: &[
        AttributeSchema::required(
            "access_grant",
            "The root access grant to derive the new access grant from.",
        )
        .sensitive(),
        AttributeSchema::optional("allow_download", "Allow downloads with the derived grant."),
        AttributeSchema::optional("allow_upload", "Allow uploads with the derived grant."),
        AttributeSchema::optional("allow_list", "Allow list operations with the derived grant."),
        AttributeSchema::optional("allow_delete", "Allow deletes with the derived grant."),
        AttributeSchema::optional(
            "bucket",
            "Buckets and prefixes the derived grant is confined to.",
        ),
        AttributeSchema::computed(
            "derived_access_grant",
            "The access grant derived from the provided grant.",
        )
        .sensitive(),
    ],
};

/// One bucket entry of an access grant declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketScope {
    pub name: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessGrantConfig {
    pub access_grant: String,
    #[serde(default)]
    pub allow_download: bool,
    #[serde(default)]
    pub allow_upload: bool,
    #[serde(default)]
    pub allow_list: bool,
    #[serde(default)]
    pub allow_delete: bool,
    #[serde(default)]
    pub bucket: Vec<BucketScope>,
}

impl AccessGrantConfig {
    pub fn permission(&self) -> Permission {
        Permission {
            allow_download: self.allow_download,
            allow_upload: self.allow_upload,
            allow_list: self.allow_list,
            allow_delete: self.allow_delete,
        }
    }

    /// One whole-bucket prefix per bucket without paths, one prefix per path
    /// otherwise.
    pub fn share_prefixes(&self) -> stratum_core::Result<Vec<SharePrefix>> {
        let mut prefixes = Vec::new();
        for scope in &self.bucket {
            if scope.paths.is_empty() {
                prefixes.push(SharePrefix::full_bucket(scope.name.as_str())?);
            } else {
                for path in &scope.paths {
                    prefixes.push(SharePrefix::new(scope.name.as_str(), path.as_str())?);
                }
            }
        }
        Ok(prefixes)
    }
}

impl fmt::Debug for AccessGrantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGrantConfig")
            .field("access_grant", &"[REDACTED]")
            .field("permission", &self.permission())
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Parse, restrict, serialize, then identify the derived grant by its digest.
pub fn derive(config: &AccessGrantConfig) -> Result<(ResourceId, String), Diagnostics> {
    let prefixes = config
        .share_prefixes()
        .map_err(|e| credential_error("Invalid bucket scope for access grant", e))?;
    let permission = config.permission();

    let root = AccessGrant::parse(&config.access_grant)
        .map_err(|e| credential_error("Failed to parse provided access grant", e))?;
    let derived = root
        .share(&permission, &prefixes)
        .map_err(|e| credential_error("Failed to restrict provided access grant to new scope", e))?;
    let serialized = derived
        .serialize()
        .map_err(|e| credential_error("Failed to serialize derived access grant", e))?;

    Ok((ResourceId::for_access_grant(&serialized), serialized))
}

pub struct AccessGrantResource;

#[async_trait]
impl Resource for AccessGrantResource {
    fn schema(&self) -> &'static Schema {
        &ACCESS_GRANT_SCHEMA
    }

    #[instrument(skip_all, fields(resource = "storj_access_grant"))]
    async fn create(&self, ctx: &OperationContext, config: &Value) -> OperationResult {
        let config: AccessGrantConfig = decode_config(self.type_name(), config)?;
        ctx.ensure_active("Failed to derive access grant")?;

        let (id, derived) = derive(&config)?;
        tracing::info!(
            id = %id,
            permission = %config.permission(),
            scopes = config.bucket.len(),
            "derived access grant"
        );

        Ok(ACCESS_GRANT_SCHEMA
            .state(id.to_base64())
            .set("access_grant", config.access_grant.as_str())
            .set("allow_download", config.allow_download)
            .set("allow_upload", config.allow_upload)
            .set("allow_list", config.allow_list)
            .set("allow_delete", config.allow_delete)
            .set(
                "bucket",
                if config.bucket.is_empty() {
                    Value::Null
                } else {
                    json!(config.bucket)
                },
            )
            .set("derived_access_grant", derived)
            .build())
    }

    /// Derived grants cannot be fetched back from the network; the state is
    /// reported unchanged.
    async fn read(&self, _ctx: &OperationContext, state: &ResourceState) -> OperationResult {
        Ok(state.clone())
    }

    /// Nothing to revoke remotely.
    async fn delete(&self, _ctx: &OperationContext, _state: &ResourceState) -> Result<(), Diagnostics> {
        Ok(())
    }
}
