//! In-process storage network.

use crate::authorize::{
    authorize, authorize_bucket, validate_bucket_name, validate_key, verify_grant,
};
use crate::error::{StorageError, StorageResult};
use crate::traits::{
    BucketInfo, ByteStream, CustomMetadata, ListObjectsOptions, ListingEntry, Network,
    ObjectInfo, ObjectStream, ObjectUpload, Project, select_listing,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stratum_core::{AccessGrant, Action};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::instrument;

/// Chunk size for streaming downloads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
}

struct Bucket {
    created: OffsetDateTime,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    custom_metadata: CustomMetadata,
}

impl StoredObject {
    fn info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            is_prefix: false,
            size: self.data.len() as u64,
            custom_metadata: self.custom_metadata.clone(),
        }
    }
}

/// A storage network held entirely in memory.
///
/// Cloning shares the underlying buckets.
#[derive(Clone)]
pub struct MemoryNetwork {
    root_secret: Arc<Vec<u8>>,
    state: Arc<RwLock<State>>,
}

impl MemoryNetwork {
    /// Create an empty network that verifies API keys against `root_secret`.
    pub fn new(root_secret: impl AsRef<[u8]>) -> Self {
        Self {
            root_secret: Arc::new(root_secret.as_ref().to_vec()),
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    #[instrument(skip_all, fields(backend = "memory"))]
    async fn open_project(&self, grant: &AccessGrant) -> StorageResult<Box<dyn Project>> {
        verify_grant(grant, &self.root_secret)?;
        Ok(Box::new(MemoryProject {
            grant: grant.clone(),
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryProject {
    grant: AccessGrant,
    state: Arc<RwLock<State>>,
    closed: AtomicBool,
}

impl MemoryProject {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::ProjectClosed)
        } else {
            Ok(())
        }
    }

    fn check_object(&self, action: Action, bucket: &str, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        validate_bucket_name(bucket)?;
        validate_key(key)?;
        authorize(&self.grant, action, bucket, key)
    }

    fn check_bucket(&self, action: Action, bucket: &str) -> StorageResult<()> {
        self.ensure_open()?;
        validate_bucket_name(bucket)?;
        authorize_bucket(&self.grant, action, bucket)
    }

    /// Snapshot the visible keys of a bucket and select a listing page.
    async fn listing(
        &self,
        bucket: &str,
        options: &ListObjectsOptions,
    ) -> StorageResult<Vec<ObjectInfo>> {
        self.check_bucket(Action::List, bucket)?;

        let mut infos: BTreeMap<String, ObjectInfo> = {
            let state = self.state.read().await;
            let entry = state
                .buckets
                .get(bucket)
                .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
            entry
                .objects
                .iter()
                .filter(|(key, _)| self.grant.permits(Action::List, bucket, key))
                .map(|(key, object)| (key.clone(), object.info(key)))
                .collect()
        };

        let keys: Vec<String> = infos.keys().cloned().collect();
        let entries = select_listing(keys, options)
            .into_iter()
            .filter_map(|entry| match entry {
                ListingEntry::Object(key) => infos.remove(&key),
                ListingEntry::Prefix(prefix) => Some(ObjectInfo::prefix(prefix)),
            })
            .collect();
        Ok(entries)
    }
}

#[async_trait]
impl Project for MemoryProject {
    #[instrument(skip(self), fields(backend = "memory"))]
    async fn create_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.check_bucket(Action::Upload, bucket)?;
        let mut state = self.state.write().await;
        let entry = state
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| Bucket {
                created: OffsetDateTime::now_utc(),
                objects: BTreeMap::new(),
            });
        Ok(BucketInfo {
            name: bucket.to_string(),
            created: entry.created,
        })
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn stat_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.check_bucket(Action::List, bucket)?;
        let state = self.state.read().await;
        let entry = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        Ok(BucketInfo {
            name: bucket.to_string(),
            created: entry.created,
        })
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.check_bucket(Action::Delete, bucket)?;
        let mut state = self.state.write().await;
        let entry = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        if !entry.objects.is_empty() {
            return Err(StorageError::BucketNotEmpty(bucket.to_string()));
        }
        let created = entry.created;
        state.buckets.remove(bucket);
        Ok(BucketInfo {
            name: bucket.to_string(),
            created,
        })
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<Box<dyn ObjectUpload>> {
        self.check_object(Action::Upload, bucket, key)?;
        if !self.state.read().await.buckets.contains_key(bucket) {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        Ok(Box::new(MemoryUpload {
            state: self.state.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            buffer: BytesMut::new(),
            custom_metadata: CustomMetadata::new(),
        }))
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn download_object(&self, bucket: &str, key: &str) -> StorageResult<ByteStream> {
        self.check_object(Action::Download, bucket, key)?;
        let data = {
            let state = self.state.read().await;
            let entry = state
                .buckets
                .get(bucket)
                .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
            entry
                .objects
                .get(key)
                .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))?
                .data
                .clone()
        };

        let stream = async_stream::stream! {
            let mut offset = 0;
            while offset < data.len() {
                let end = (offset + STREAM_CHUNK_SIZE).min(data.len());
                yield Ok(data.slice(offset..end));
                offset = end;
            }
        };
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.check_object(Action::List, bucket, key)?;
        let state = self.state.read().await;
        let entry = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        entry
            .objects
            .get(key)
            .map(|object| object.info(key))
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))
    }

    fn list_objects<'a>(&'a self, bucket: &str, options: ListObjectsOptions) -> ObjectStream<'a> {
        let bucket = bucket.to_string();

        let stream = async_stream::stream! {
            match self.listing(&bucket, &options).await {
                Ok(entries) => {
                    for info in entries {
                        yield Ok(info);
                    }
                }
                Err(e) => yield Err(e),
            }
        };

        Box::pin(stream)
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.check_object(Action::Delete, bucket, key)?;
        let mut state = self.state.write().await;
        let entry = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        entry
            .objects
            .remove(key)
            .map(|object| object.info(key))
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryUpload {
    state: Arc<RwLock<State>>,
    bucket: String,
    key: String,
    buffer: BytesMut,
    custom_metadata: CustomMetadata,
}

#[async_trait]
impl ObjectUpload for MemoryUpload {
    async fn set_custom_metadata(&mut self, metadata: CustomMetadata) -> StorageResult<()> {
        if metadata.keys().any(|k| k.is_empty()) {
            return Err(StorageError::InvalidMetadata(
                "metadata keys must not be empty".to_string(),
            ));
        }
        self.custom_metadata = metadata;
        Ok(())
    }

    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<ObjectInfo> {
        let MemoryUpload {
            state,
            bucket,
            key,
            buffer,
            custom_metadata,
        } = *self;

        let mut state = state.write().await;
        let entry = state
            .buckets
            .get_mut(&bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.clone()))?;
        let object = StoredObject {
            data: buffer.freeze(),
            custom_metadata,
        };
        let info = object.info(&key);
        entry.objects.insert(key, object);
        Ok(info)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
