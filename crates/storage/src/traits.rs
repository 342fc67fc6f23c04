//! Storage network trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;
use stratum_core::AccessGrant;
use time::OffsetDateTime;

/// A boxed stream of bytes for streaming downloads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A boxed stream of listed objects.
pub type ObjectStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<ObjectInfo>> + Send + 'a>>;

/// Custom key/value metadata attached to an object.
pub type CustomMetadata = BTreeMap<String, String>;

/// Information about a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// When the bucket was created.
    pub created: OffsetDateTime,
}

/// Information about an object or, in non-recursive listings, a prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key (or collapsed prefix ending in `/`).
    pub key: String,
    /// True when this entry is a collapsed prefix rather than an object.
    pub is_prefix: bool,
    /// Content length in bytes.
    pub size: u64,
    /// Custom metadata set at upload time.
    pub custom_metadata: CustomMetadata,
}

impl ObjectInfo {
    pub(crate) fn prefix(key: String) -> Self {
        Self {
            key,
            is_prefix: true,
            size: 0,
            custom_metadata: CustomMetadata::new(),
        }
    }
}

/// Options for listing objects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListObjectsOptions {
    /// Only list keys starting with this prefix.
    pub prefix: String,
    /// Start listing after this key (exclusive).
    pub cursor: String,
    /// List every key under the prefix instead of collapsing at `/`.
    pub recursive: bool,
}

impl ListObjectsOptions {
    /// Recursive listing under a prefix.
    pub fn recursive(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            cursor: String::new(),
            recursive: true,
        }
    }

    /// Set the cursor.
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = cursor.into();
        self
    }
}

/// Apply prefix, cursor and recursion to keys in ascending order.
///
/// `keys` must already be sorted. Non-recursive listings collapse everything
/// below the next `/` after the prefix into a single prefix entry.
pub fn select_listing<I>(keys: I, options: &ListObjectsOptions) -> Vec<ListingEntry>
where
    I: IntoIterator<Item = String>,
{
    let mut entries = Vec::new();
    let mut last_prefix: Option<String> = None;

    for key in keys {
        if !key.starts_with(&options.prefix) {
            continue;
        }
        if !options.cursor.is_empty() && key.as_str() <= options.cursor.as_str() {
            continue;
        }

        if !options.recursive {
            let rest = &key[options.prefix.len()..];
            if let Some(pos) = rest.find('/') {
                let collapsed = format!("{}{}", options.prefix, &rest[..=pos]);
                if last_prefix.as_deref() != Some(collapsed.as_str()) {
                    last_prefix = Some(collapsed.clone());
                    entries.push(ListingEntry::Prefix(collapsed));
                }
                continue;
            }
        }

        entries.push(ListingEntry::Object(key));
    }

    entries
}

/// One selected listing entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListingEntry {
    Object(String),
    Prefix(String),
}

/// A storage network: the satellite plus its storage nodes.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Open a project session for an access grant.
    ///
    /// Fails with `InvalidAccess` if the grant's API key does not verify.
    async fn open_project(&self, grant: &AccessGrant) -> StorageResult<Box<dyn Project>>;

    /// Get the name of this network backend, for logging.
    fn backend_name(&self) -> &'static str;
}

/// A project session bound to one access grant.
///
/// Every call is authorized against the grant's effective capability.
#[async_trait]
pub trait Project: Send + Sync {
    /// Create a bucket. Creating a bucket that already exists succeeds.
    async fn create_bucket(&self, bucket: &str) -> StorageResult<BucketInfo>;

    /// Get bucket information.
    async fn stat_bucket(&self, bucket: &str) -> StorageResult<BucketInfo>;

    /// Delete an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> StorageResult<BucketInfo>;

    /// Start an upload. Nothing is visible under `key` until commit.
    async fn upload_object(&self, bucket: &str, key: &str)
    -> StorageResult<Box<dyn ObjectUpload>>;

    /// Download an object as a byte stream.
    async fn download_object(&self, bucket: &str, key: &str) -> StorageResult<ByteStream>;

    /// Get object information without its content.
    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo>;

    /// List objects in a bucket, in ascending key order.
    ///
    /// Authorization and missing-bucket failures are reported as the first
    /// stream item.
    fn list_objects<'a>(&'a self, bucket: &str, options: ListObjectsOptions) -> ObjectStream<'a>;

    /// Delete an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo>;

    /// Close the session. Calls after close fail with `ProjectClosed`.
    async fn close(&self) -> StorageResult<()>;
}

/// An in-progress object upload.
#[async_trait]
pub trait ObjectUpload: Send {
    /// Replace the custom metadata committed with the object.
    async fn set_custom_metadata(&mut self, metadata: CustomMetadata) -> StorageResult<()>;

    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Make the object visible under its key.
    async fn commit(self: Box<Self>) -> StorageResult<ObjectInfo>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
