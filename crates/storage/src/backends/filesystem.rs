//! Local filesystem storage network.
//!
//! Layout under the root directory:
//!
//! ```text
//! buckets/<bucket>/<encoded key>        object content
//! metadata/<bucket>.json                bucket record
//! metadata/<bucket>/<encoded key>.json  object custom metadata
//! tmp/<uuid>                            uploads in progress
//! ```
//!
//! Keys are stored flat, base64url-encoded, so `a` and `a/b` can coexist.

use crate::authorize::{
    authorize, authorize_bucket, validate_bucket_name, validate_key, verify_grant,
};
use crate::error::{StorageError, StorageResult};
use crate::traits::{
    BucketInfo, ByteStream, CustomMetadata, ListObjectsOptions, ListingEntry, Network,
    ObjectInfo, ObjectStream, ObjectUpload, Project, select_listing,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stratum_core::{AccessGrant, Action};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Longest file name most filesystems accept.
const MAX_FILE_NAME: usize = 255;

#[derive(Serialize, Deserialize)]
struct BucketRecord {
    #[serde(with = "time::serde::rfc3339")]
    created: OffsetDateTime,
}

#[derive(Default, Serialize, Deserialize)]
struct ObjectRecord {
    #[serde(default)]
    custom_metadata: CustomMetadata,
}

/// A storage network persisted under a local directory.
pub struct FilesystemNetwork {
    root: Arc<PathBuf>,
    root_secret: Vec<u8>,
}

impl FilesystemNetwork {
    /// Create a network rooted at `root`, creating the layout if needed.
    pub async fn new(root: impl AsRef<Path>, root_secret: impl AsRef<[u8]>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in ["buckets", "metadata", "tmp"] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self {
            root: Arc::new(root),
            root_secret: root_secret.as_ref().to_vec(),
        })
    }
}

#[async_trait]
impl Network for FilesystemNetwork {
    #[instrument(skip_all, fields(backend = "filesystem"))]
    async fn open_project(&self, grant: &AccessGrant) -> StorageResult<Box<dyn Project>> {
        verify_grant(grant, &self.root_secret)?;
        Ok(Box::new(FilesystemProject {
            grant: grant.clone(),
            root: self.root.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

/// Resolve a path below `root`, refusing anything that escapes it.
///
/// Runs on the blocking pool because it canonicalizes and stats paths.
async fn resolve(root: &Path, relative: PathBuf) -> StorageResult<PathBuf> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || resolve_sync(&root, &relative))
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
}

fn resolve_sync(root: &Path, relative: &Path) -> StorageResult<PathBuf> {
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "unsafe path component in {}",
            relative.display()
        )));
    }

    let root_canonical = root.canonicalize().map_err(|e| {
        StorageError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to canonicalize root: {e}"),
        ))
    })?;
    let path = root.join(relative);

    // Symlinks inside the root must not lead outside it, whether the target
    // is the path itself or its nearest existing ancestor.
    let mut candidate = Some(path.as_path());
    while let Some(current) = candidate {
        match std::fs::symlink_metadata(current) {
            Ok(meta) => {
                let canonical = current.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!(
                            "dangling symlink at {}",
                            current.display()
                        ))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "{} escapes storage root",
                        relative.display()
                    )));
                }
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                candidate = current.parent();
            }
            Err(err) => return Err(StorageError::Io(err)),
        }
    }

    Ok(path)
}

fn encode_key(key: &str) -> StorageResult<String> {
    let encoded = URL_SAFE_NO_PAD.encode(key.as_bytes());
    // Leave room for the ".json" suffix of the metadata sidecar.
    if encoded.len() + 5 > MAX_FILE_NAME {
        return Err(StorageError::InvalidKey(format!(
            "key of {} bytes is too long for the filesystem network",
            key.len()
        )));
    }
    Ok(encoded)
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(name).ok()?;
    String::from_utf8(bytes).ok()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    match fs::read(path).await {
        Ok(data) => serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StorageError::InvalidMetadata(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Write JSON to a fresh file under tmp/ and return its path.
async fn stage_json<T: Serialize>(root: &Path, value: &T) -> StorageResult<PathBuf> {
    let data = serde_json::to_vec(value)
        .map_err(|e| StorageError::InvalidMetadata(e.to_string()))?;
    let temp_path = root.join("tmp").join(Uuid::new_v4().to_string());
    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await
    }
    .await;
    match written {
        Ok(()) => Ok(temp_path),
        Err(e) => {
            discard(&temp_path).await;
            Err(StorageError::Io(e))
        }
    }
}

/// Write JSON through a temp file and rename, so readers never see a partial record.
async fn write_json<T: Serialize>(root: &Path, path: &Path, value: &T) -> StorageResult<()> {
    let temp_path = stage_json(root, value).await?;
    let renamed = async {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp_path, path).await
    }
    .await;
    if renamed.is_err() {
        discard(&temp_path).await;
    }
    renamed.map_err(StorageError::Io)
}

/// Best-effort removal of a leftover temp file.
async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file"),
    }
}

struct FilesystemProject {
    grant: AccessGrant,
    root: Arc<PathBuf>,
    closed: AtomicBool,
}

impl FilesystemProject {
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

    fn bucket_record_path(&self, bucket: &str) -> PathBuf {
        self.root.join("metadata").join(format!("{bucket}.json"))
    }

    async fn bucket_dir(&self, bucket: &str) -> StorageResult<PathBuf> {
        resolve(&self.root, Path::new("buckets").join(bucket)).await
    }

    async fn bucket_info(&self, bucket: &str) -> StorageResult<BucketInfo> {
        let record: BucketRecord = read_json(&self.bucket_record_path(bucket))
            .await?
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        Ok(BucketInfo {
            name: bucket.to_string(),
            created: record.created,
        })
    }

    /// Content and sidecar paths for an object.
    async fn object_paths(&self, bucket: &str, key: &str) -> StorageResult<(PathBuf, PathBuf)> {
        let encoded = encode_key(key)?;
        let data = resolve(&self.root, Path::new("buckets").join(bucket).join(&encoded)).await?;
        let meta = resolve(
            &self.root,
            Path::new("metadata")
                .join(bucket)
                .join(format!("{encoded}.json")),
        )
        .await?;
        Ok((data, meta))
    }

    async fn object_info(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        let (data_path, meta_path) = self.object_paths(bucket, key).await?;
        let metadata = match fs::metadata(&data_path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(StorageError::ObjectNotFound(key.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::ObjectNotFound(key.to_string()));
            }
            Err(e) => return Err(StorageError::Io(e)),
        };
        let record: ObjectRecord = read_json(&meta_path).await?.unwrap_or_default();
        Ok(ObjectInfo {
            key: key.to_string(),
            is_prefix: false,
            size: metadata.len(),
            custom_metadata: record.custom_metadata,
        })
    }

    async fn require_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.bucket_info(bucket).await.map(|_| ())
    }

    async fn listing(
        &self,
        bucket: &str,
        options: &ListObjectsOptions,
    ) -> StorageResult<Vec<ObjectInfo>> {
        self.check_bucket(Action::List, bucket)?;
        self.require_bucket(bucket).await?;

        let dir = self.bucket_dir(bucket).await?;
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            // Symlinks are never objects.
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(decode_key) else {
                tracing::warn!(bucket, file = ?name, "skipping undecodable object file");
                continue;
            };
            if self.grant.permits(Action::List, bucket, &key) {
                keys.push(key);
            }
        }
        keys.sort();

        let mut infos = Vec::new();
        for entry in select_listing(keys, options) {
            match entry {
                ListingEntry::Object(key) => match self.object_info(bucket, &key).await {
                    Ok(info) => infos.push(info),
                    // Deleted between read_dir and stat.
                    Err(StorageError::ObjectNotFound(_)) => {}
                    Err(e) => return Err(e),
                },
                ListingEntry::Prefix(prefix) => infos.push(ObjectInfo::prefix(prefix)),
            }
        }
        Ok(infos)
    }
}

#[async_trait]
impl Project for FilesystemProject {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn create_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.check_bucket(Action::Upload, bucket)?;
        match self.bucket_info(bucket).await {
            Ok(info) => return Ok(info),
            Err(StorageError::BucketNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        fs::create_dir_all(self.bucket_dir(bucket).await?).await?;
        let record = BucketRecord {
            created: OffsetDateTime::now_utc(),
        };
        write_json(&self.root, &self.bucket_record_path(bucket), &record).await?;
        tracing::debug!(bucket, "created bucket");
        Ok(BucketInfo {
            name: bucket.to_string(),
            created: record.created,
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn stat_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.check_bucket(Action::List, bucket)?;
        self.bucket_info(bucket).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.check_bucket(Action::Delete, bucket)?;
        let info = self.bucket_info(bucket).await?;

        let dir = self.bucket_dir(bucket).await?;
        match fs::read_dir(&dir).await {
            Ok(mut entries) => {
                if entries.next_entry().await?.is_some() {
                    return Err(StorageError::BucketNotEmpty(bucket.to_string()));
                }
                fs::remove_dir(&dir).await?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }

        let meta_dir = self.root.join("metadata").join(bucket);
        match fs::remove_dir_all(&meta_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }
        fs::remove_file(self.bucket_record_path(bucket)).await?;
        Ok(info)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<Box<dyn ObjectUpload>> {
        self.check_object(Action::Upload, bucket, key)?;
        self.require_bucket(bucket).await?;
        let (data_path, meta_path) = self.object_paths(bucket, key).await?;

        // Uploads land in tmp/ so a crash never leaves a partial object visible.
        let temp_path = self.root.join("tmp").join(Uuid::new_v4().to_string());
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemUpload {
            root: self.root.clone(),
            key: key.to_string(),
            file,
            temp_path,
            data_path,
            meta_path,
            custom_metadata: CustomMetadata::new(),
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn download_object(&self, bucket: &str, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        self.check_object(Action::Download, bucket, key)?;
        self.require_bucket(bucket).await?;
        let (data_path, _) = self.object_paths(bucket, key).await?;
        let file = fs::File::open(&data_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.check_object(Action::List, bucket, key)?;
        self.require_bucket(bucket).await?;
        self.object_info(bucket, key).await
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

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.check_object(Action::Delete, bucket, key)?;
        self.require_bucket(bucket).await?;
        let info = self.object_info(bucket, key).await?;
        let (data_path, meta_path) = self.object_paths(bucket, key).await?;

        fs::remove_file(&data_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        match fs::remove_file(&meta_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }
        Ok(info)
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FilesystemUpload {
    root: Arc<PathBuf>,
    key: String,
    file: fs::File,
    temp_path: PathBuf,
    data_path: PathBuf,
    meta_path: PathBuf,
    custom_metadata: CustomMetadata,
    bytes_written: u64,
}

/// Move finished content and its metadata sidecar into place.
///
/// The sidecar is staged before anything becomes visible and renamed after
/// the content, so a failed commit leaves the previous object and its
/// metadata untouched.
async fn publish(
    mut file: fs::File,
    root: &Path,
    temp_path: &Path,
    data_path: &Path,
    meta_path: &Path,
    record: &ObjectRecord,
) -> StorageResult<()> {
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let staged_meta = stage_json(root, record).await?;
    let renamed = async {
        for dir in [data_path.parent(), meta_path.parent()].into_iter().flatten() {
            fs::create_dir_all(dir).await?;
        }
        fs::rename(temp_path, data_path).await?;
        fs::rename(&staged_meta, meta_path).await
    }
    .await;
    if renamed.is_err() {
        discard(&staged_meta).await;
    }
    renamed.map_err(StorageError::Io)
}

#[async_trait]
impl ObjectUpload for FilesystemUpload {
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
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<ObjectInfo> {
        let this = *self;
        let record = ObjectRecord {
            custom_metadata: this.custom_metadata,
        };
        let published = publish(
            this.file,
            &this.root,
            &this.temp_path,
            &this.data_path,
            &this.meta_path,
            &record,
        )
        .await;
        if let Err(e) = published {
            discard(&this.temp_path).await;
            return Err(e);
        }
        tracing::debug!(key = %this.key, size = this.bytes_written, "committed upload");

        Ok(ObjectInfo {
            key: this.key,
            is_prefix: false,
            size: this.bytes_written,
            custom_metadata: record.custom_metadata,
        })
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        drop(this.file);
        match fs::remove_file(&this.temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
