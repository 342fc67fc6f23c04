//! `storj_bucket` resource and data source.

use super::{DataSource, OperationResult, Resource, decode_config, state_str};
use crate::context::OperationContext;
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::schema::{AttributeSchema, Schema};
use crate::state::ResourceState;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

pub static BUCKET_SCHEMA: Schema = Schema {
    type_name: "storj_bucket",
    description: "A bucket in the project of the provider's access grant.",
    attributes: &[AttributeSchema::required("bucket", "The name of the bucket to create.")],
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    pub bucket: String,
}

fn bucket_state(name: &str) -> ResourceState {
    BUCKET_SCHEMA.state(name).set("bucket", name).build()
}

fn bucket_name(state: &ResourceState) -> Result<&str, Diagnostics> {
    if state.id.is_empty() {
        state_str(state, "bucket")
    } else {
        Ok(&state.id)
    }
}

/// Stat a bucket and report it under its name.
async fn read_bucket(ctx: &OperationContext, name: &str) -> OperationResult {
    let project = ctx.open_project().await?;
    let result = ctx
        .run(
            ErrorKind::Storage,
            "Failed to read bucket",
            project.stat_bucket(name),
        )
        .await
        .map(|info| bucket_state(&info.name));
    project.finish(result).await
}

pub struct BucketResource;

#[async_trait]
impl Resource for BucketResource {
    fn schema(&self) -> &'static Schema {
        &BUCKET_SCHEMA
    }

    #[instrument(skip_all, fields(resource = "storj_bucket"))]
    async fn create(&self, ctx: &OperationContext, config: &Value) -> OperationResult {
        let config: BucketConfig = decode_config(self.type_name(), config)?;
        if config.bucket.is_empty() {
            return Err(Diagnostics::error(
                ErrorKind::Validation,
                "Invalid storj_bucket configuration",
                "bucket must not be empty",
            ));
        }

        let project = ctx.open_project().await?;
        let result = ctx
            .run(
                ErrorKind::Storage,
                "Failed to create bucket",
                project.create_bucket(&config.bucket),
            )
            .await
            .map(|_| bucket_state(&config.bucket));
        let result = project.finish(result).await;
        if result.is_ok() {
            tracing::info!(bucket = %config.bucket, "bucket created");
        }
        result
    }

    #[instrument(skip_all, fields(resource = "storj_bucket", id = %state.id))]
    async fn read(&self, ctx: &OperationContext, state: &ResourceState) -> OperationResult {
        read_bucket(ctx, bucket_name(state)?).await
    }

    #[instrument(skip_all, fields(resource = "storj_bucket", id = %state.id))]
    async fn delete(&self, ctx: &OperationContext, state: &ResourceState) -> Result<(), Diagnostics> {
        let name = bucket_name(state)?;
        let project = ctx.open_project().await?;
        let result = ctx
            .run(
                ErrorKind::Storage,
                "Failed to delete bucket",
                project.delete_bucket(name),
            )
            .await
            .map(|_| ());
        project.finish(result).await
    }
}

pub struct BucketDataSource;

#[async_trait]
impl DataSource for BucketDataSource {
    fn schema(&self) -> &'static Schema {
        &BUCKET_SCHEMA
    }

    #[instrument(skip_all, fields(data_source = "storj_bucket"))]
    async fn read(&self, ctx: &OperationContext, config: &Value) -> OperationResult {
        let config: BucketConfig = decode_config(self.type_name(), config)?;
        read_bucket(ctx, &config.bucket).await
    }
}
