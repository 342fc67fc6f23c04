//! `storj_object` resource and data source, and the `storj_objects` listing.

use super::{DataSource, OperationResult, Resource, decode_config, state_str};
use crate::context::OperationContext;
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::schema::{AttributeSchema, Schema, StateBuilder};
use crate::state::ResourceState;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use stratum_storage::{ByteStream, ListObjectsOptions, ObjectInfo, ObjectUpload, Project};
use tokio_util::io::ReaderStream;
use tracing::instrument;

pub static OBJECT_SCHEMA: Schema = Schema {
    type_name: "storj_object",
    description: "An object uploaded from a literal string, base64 payload or local file.",
    attributes: &[
        AttributeSchema::required("bucket", "The name of the bucket holding the object."),
        AttributeSchema::required("key", "The key of the object in the bucket."),
        AttributeSchema::optional(
            "content",
            "Literal string value to use as the object content, uploaded as UTF-8 text.",
        )
        .updatable(),
        AttributeSchema::optional(
            "content_base64",
            "Base64-encoded data decoded and uploaded as raw bytes.",
        )
        .updatable(),
        AttributeSchema::optional("source", "Path to a file uploaded as raw bytes.").updatable(),
        AttributeSchema::optional("metadata", "Map of custom metadata keys and values.")
            .updatable(),
    ],
};

pub static OBJECTS_SCHEMA: Schema = Schema {
    type_name: "storj_objects",
    description: "Keys of the objects under a bucket and prefix.",
    attributes: &[
        AttributeSchema::required("bucket", "The name of the bucket to list."),
        AttributeSchema::optional("prefix", "Only list keys starting with this prefix."),
        AttributeSchema::optional("max_keys", "The maximum number of keys to return."),
        AttributeSchema::optional("start_after", "List keys after this key."),
        AttributeSchema::computed("keys", "The listed keys, in ascending order."),
    ],
};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectConfig {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_base64: Option<String>,
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ObjectConfig {
    fn validate(&self) -> Result<(), Diagnostics> {
        for (field, value) in [("bucket", &self.bucket), ("key", &self.key)] {
            if value.is_empty() {
                return Err(Diagnostics::error(
                    ErrorKind::Validation,
                    "Invalid storj_object configuration",
                    format!("{field} must not be empty"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectsQuery {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    /// Zero means no limit.
    #[serde(default)]
    pub max_keys: u64,
    #[serde(default)]
    pub start_after: String,
}

/// Where an object's content comes from.
///
/// Empty strings count as unset. Naming more than one source is rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentSource {
    Empty,
    Text(String),
    Base64(Bytes),
    File(PathBuf),
}

impl ContentSource {
    pub fn resolve(config: &ObjectConfig) -> Result<Self, Diagnostics> {
        let content = config.content.as_deref().filter(|s| !s.is_empty());
        let content_base64 = config.content_base64.as_deref().filter(|s| !s.is_empty());
        let source = config.source.as_ref().filter(|p| !p.as_os_str().is_empty());

        let named: Vec<&str> = [
            ("source", source.is_some()),
            ("content", content.is_some()),
            ("content_base64", content_base64.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
        if named.len() > 1 {
            return Err(Diagnostics::error(
                ErrorKind::Validation,
                "Conflicting object content sources",
                format!(
                    "only one of source, content or content_base64 may be set, got {}",
                    named.join(", ")
                ),
            ));
        }

        if let Some(path) = source {
            return Ok(Self::File(path.clone()));
        }
        if let Some(text) = content {
            return Ok(Self::Text(text.to_string()));
        }
        if let Some(encoded) = content_base64 {
            let data = STANDARD.decode(encoded).map_err(|e| {
                Diagnostics::error(ErrorKind::Validation, "Failed to decode content_base64", e)
            })?;
            return Ok(Self::Base64(Bytes::from(data)));
        }
        Ok(Self::Empty)
    }

    /// Open the content for streaming.
    async fn open(self) -> Result<BoxStream<'static, io::Result<Bytes>>, Diagnostics> {
        match self {
            Self::Empty => Ok(stream::empty().boxed()),
            Self::Text(text) => {
                Ok(stream::once(async move { Ok::<_, io::Error>(Bytes::from(text)) }).boxed())
            }
            Self::Base64(data) => Ok(stream::once(async move { Ok::<_, io::Error>(data) }).boxed()),
            Self::File(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    Diagnostics::error(
                        ErrorKind::Validation,
                        "Failed to open source file",
                        format!("{}: {e}", path.display()),
                    )
                })?;
                Ok(ReaderStream::new(file).boxed())
            }
        }
    }
}

fn metadata_value(metadata: &BTreeMap<String, String>) -> Value {
    if metadata.is_empty() {
        Value::Null
    } else {
        json!(metadata)
    }
}

fn non_empty(value: Option<&str>) -> Value {
    match value {
        Some(s) if !s.is_empty() => Value::String(s.to_string()),
        _ => Value::Null,
    }
}

fn object_state(config: &ObjectConfig) -> ResourceState {
    OBJECT_SCHEMA
        .state(config.key.as_str())
        .set("bucket", config.bucket.as_str())
        .set("key", config.key.as_str())
        .set("content", non_empty(config.content.as_deref()))
        .set("content_base64", non_empty(config.content_base64.as_deref()))
        .set(
            "source",
            non_empty(config.source.as_deref().and_then(|p| p.to_str())),
        )
        .set("metadata", metadata_value(&config.metadata))
        .build()
}

/// Stream everything into an open upload. Stops at the first failure.
async fn write_content(
    ctx: &OperationContext,
    upload: &mut dyn ObjectUpload,
    metadata: &BTreeMap<String, String>,
    content: &mut BoxStream<'static, io::Result<Bytes>>,
) -> Result<u64, Diagnostics> {
    ctx.run(
        ErrorKind::Storage,
        "Failed to set metadata for object",
        upload.set_custom_metadata(metadata.clone()),
    )
    .await?;

    let mut written = 0u64;
    while let Some(chunk) = ctx
        .run(
            ErrorKind::Internal,
            "Failed to read object content",
            content.try_next(),
        )
        .await?
    {
        written += chunk.len() as u64;
        ctx.run(
            ErrorKind::Storage,
            "Failed to upload object content",
            upload.write(chunk),
        )
        .await?;
    }

    ctx.ensure_active("Failed to commit object upload")?;
    Ok(written)
}

/// Upload and commit, aborting the upload on any failure before commit.
async fn upload_object(
    ctx: &OperationContext,
    project: &dyn Project,
    config: &ObjectConfig,
    mut content: BoxStream<'static, io::Result<Bytes>>,
) -> Result<ObjectInfo, Diagnostics> {
    let mut upload = ctx
        .run(
            ErrorKind::Storage,
            "Failed to start object upload",
            project.upload_object(&config.bucket, &config.key),
        )
        .await?;

    match write_content(ctx, upload.as_mut(), &config.metadata, &mut content).await {
        Ok(written) => {
            tracing::debug!(bucket = %config.bucket, key = %config.key, written, "committing upload");
            // Commit is not raced against cancellation: once started it either
            // publishes the whole object or nothing.
            upload.commit().await.map_err(|e| {
                Diagnostics::error(ErrorKind::Storage, "Failed to commit object upload", e)
            })
        }
        Err(mut diags) => {
            if let Err(e) = upload.abort().await {
                diags.push_warning(ErrorKind::Storage, "Failed to abort object upload", e);
            }
            Err(diags)
        }
    }
}

async fn collect_download(stream: ByteStream) -> stratum_storage::StorageResult<Bytes> {
    let data = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(data.freeze())
}

/// Download an object fully and expose raw and base64 views of it.
async fn read_object(
    ctx: &OperationContext,
    bucket: &str,
    key: &str,
    carried: impl FnOnce(StateBuilder) -> StateBuilder,
) -> OperationResult {
    let project = ctx.open_project().await?;
    let result = async {
        let stream = ctx
            .run(
                ErrorKind::Storage,
                "Failed to download object",
                project.download_object(bucket, key),
            )
            .await?;
        ctx.run(
            ErrorKind::Storage,
            "Failed to download object",
            collect_download(stream),
        )
        .await
    }
    .await;
    let data = project.finish(result).await?;

    let builder = OBJECT_SCHEMA
        .state(key)
        .set("bucket", bucket)
        .set("key", key)
        .set("content", String::from_utf8_lossy(&data).into_owned())
        .set("content_base64", STANDARD.encode(&data));
    Ok(carried(builder).build())
}

pub struct ObjectResource;

impl ObjectResource {
    async fn put(&self, ctx: &OperationContext, config: &Value) -> OperationResult {
        let config: ObjectConfig = decode_config(self.type_name(), config)?;
        config.validate()?;
        let content = ContentSource::resolve(&config)?.open().await?;

        let project = ctx.open_project().await?;
        let result = upload_object(ctx, &*project, &config, content).await;
        let info = project.finish(result).await?;

        tracing::info!(bucket = %config.bucket, key = %config.key, size = info.size, "object uploaded");
        Ok(object_state(&config))
    }
}

#[async_trait]
impl Resource for ObjectResource {
    fn schema(&self) -> &'static Schema {
        &OBJECT_SCHEMA
    }

    #[instrument(skip_all, fields(resource = "storj_object"))]
    async fn create(&self, ctx: &OperationContext, config: &Value) -> OperationResult {
        self.put(ctx, config).await
    }

    #[instrument(skip_all, fields(resource = "storj_object", id = %state.id))]
    async fn read(&self, ctx: &OperationContext, state: &ResourceState) -> OperationResult {
        let bucket = state_str(state, "bucket")?;
        let key = if state.id.is_empty() {
            state_str(state, "key")?
        } else {
            state.id.as_str()
        };
        read_object(ctx, bucket, key, |builder| {
            builder
                .set("source", state.get("source").cloned().unwrap_or(Value::Null))
                .set("metadata", state.get("metadata").cloned().unwrap_or(Value::Null))
        })
        .await
    }

    #[instrument(skip_all, fields(resource = "storj_object", id = %_state.id))]
    async fn update(
        &self,
        ctx: &OperationContext,
        _state: &ResourceState,
        config: &Value,
    ) -> OperationResult {
        self.put(ctx, config).await
    }

    #[instrument(skip_all, fields(resource = "storj_object", id = %state.id))]
    async fn delete(&self, ctx: &OperationContext, state: &ResourceState) -> Result<(), Diagnostics> {
        let bucket = state_str(state, "bucket")?;
        let key = state_str(state, "key")?;

        let project = ctx.open_project().await?;
        let result = ctx
            .run(
                ErrorKind::Storage,
                "Failed to delete object",
                project.delete_object(bucket, key),
            )
            .await
            .map(|_| ());
        project.finish(result).await
    }
}

pub struct ObjectDataSource;

#[async_trait]
impl DataSource for ObjectDataSource {
    fn schema(&self) -> &'static Schema {
        &OBJECT_SCHEMA
    }

    #[instrument(skip_all, fields(data_source = "storj_object"))]
    async fn read(&self, ctx: &OperationContext, config: &Value) -> OperationResult {
        let config: ObjectConfig = decode_config(self.type_name(), config)?;
        config.validate()?;
        read_object(ctx, &config.bucket, &config.key, |builder| builder).await
    }
}

/// List keys, stopping at `max_keys` or exhaustion. Any error discards
/// everything collected so far.
async fn list_keys(
    ctx: &OperationContext,
    project: &dyn Project,
    query: &ObjectsQuery,
) -> Result<Vec<String>, Diagnostics> {
    let options = ListObjectsOptions::recursive(query.prefix.as_str()).after(query.start_after.as_str());
    let mut objects = project.list_objects(&query.bucket, options);

    let mut keys = Vec::new();
    while let Some(info) = ctx
        .run(
            ErrorKind::Storage,
            "Failed to iterate objects",
            objects.try_next(),
        )
        .await?
    {
        if info.is_prefix {
            continue;
        }
        keys.push(info.key);
        if query.max_keys > 0 && keys.len() as u64 >= query.max_keys {
            break;
        }
    }
    Ok(keys)
}

pub struct ObjectsDataSource;

#[async_trait]
impl DataSource for ObjectsDataSource {
    fn schema(&self) -> &'static Schema {
        &OBJECTS_SCHEMA
    }

    #[instrument(skip_all, fields(data_source = "storj_objects"))]
    async fn read(&self, ctx: &OperationContext, config: &Value) -> OperationResult {
        let query: ObjectsQuery = decode_config(self.type_name(), config)?;
        if query.bucket.is_empty() {
            return Err(Diagnostics::error(
                ErrorKind::Validation,
                "Invalid storj_objects configuration",
                "bucket must not be empty",
            ));
        }

        let project = ctx.open_project().await?;
        let result = list_keys(ctx, &*project, &query).await;
        let keys = project.finish(result).await?;

        Ok(OBJECTS_SCHEMA
            .state(query.bucket.as_str())
            .set("bucket", query.bucket.as_str())
            .set("prefix", non_empty(Some(query.prefix.as_str())))
            .set(
                "max_keys",
                if query.max_keys > 0 {
                    json!(query.max_keys)
                } else {
                    Value::Null
                },
            )
            .set("start_after", non_empty(Some(query.start_after.as_str())))
            .set("keys", json!(keys))
            .build())
    }
}
