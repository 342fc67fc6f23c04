//! A storage network that fails on demand.
//!
//! Wraps a [`MemoryNetwork`] and counts every call that reaches it, so tests
//! can assert both what failed and what was (or was not) attempted.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use stratum_core::AccessGrant;
use stratum_storage::{
    BucketInfo, ByteStream, CustomMetadata, ListObjectsOptions, MemoryNetwork, Network,
    ObjectInfo, ObjectStream, ObjectUpload, Project, StorageError, StorageResult,
};

/// Switches and counters shared by every handle a [`FaultyNetwork`] hands out.
#[derive(Default)]
pub struct Faults {
    pub fail_write: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_abort: AtomicBool,
    pub fail_close: AtomicBool,
    /// Writes never complete.
    pub hang_write: AtomicBool,
    /// Fail the listing after this many entries; zero disables.
    pub fail_list_after: AtomicUsize,

    pub projects_opened: AtomicUsize,
    pub projects_closed: AtomicUsize,
    pub uploads_started: AtomicUsize,
    pub commits: AtomicUsize,
    pub aborts: AtomicUsize,
}

impl Faults {
    pub fn set(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Total calls that reached the network.
    pub fn network_calls(&self) -> usize {
        Self::count(&self.projects_opened) + Self::count(&self.uploads_started)
    }
}

fn injected(what: &str) -> StorageError {
    StorageError::Io(std::io::Error::other(format!("injected {what} failure")))
}

#[derive(Clone)]
pub struct FaultyNetwork {
    inner: MemoryNetwork,
    pub faults: Arc<Faults>,
}

impl FaultyNetwork {
    pub fn new(inner: MemoryNetwork) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }
}

#[async_trait]
impl Network for FaultyNetwork {
    async fn open_project(&self, grant: &AccessGrant) -> StorageResult<Box<dyn Project>> {
        self.faults.projects_opened.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.open_project(grant).await?;
        Ok(Box::new(FaultyProject {
            inner,
            faults: self.faults.clone(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

struct FaultyProject {
    inner: Box<dyn Project>,
    faults: Arc<Faults>,
}

#[async_trait]
impl Project for FaultyProject {
    async fn create_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.inner.create_bucket(bucket).await
    }

    async fn stat_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.inner.stat_bucket(bucket).await
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.inner.delete_bucket(bucket).await
    }

    async fn upload_object(&self, bucket: &str, key: &str) -> StorageResult<Box<dyn ObjectUpload>> {
        self.faults.uploads_started.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.upload_object(bucket, key).await?;
        Ok(Box::new(FaultyUpload {
            inner,
            faults: self.faults.clone(),
        }))
    }

    async fn download_object(&self, bucket: &str, key: &str) -> StorageResult<ByteStream> {
        self.inner.download_object(bucket, key).await
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.inner.stat_object(bucket, key).await
    }

    fn list_objects<'a>(&'a self, bucket: &str, options: ListObjectsOptions) -> ObjectStream<'a> {
        let fail_after = self.faults.fail_list_after.load(Ordering::SeqCst);
        let inner = self.inner.list_objects(bucket, options);
        if fail_after == 0 {
            return inner;
        }
        inner
            .enumerate()
            .map(move |(i, item)| if i >= fail_after { Err(injected("list")) } else { item })
            .boxed()
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.inner.delete_object(bucket, key).await
    }

    async fn close(&self) -> StorageResult<()> {
        self.faults.projects_closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await?;
        if self.faults.fail_close.load(Ordering::SeqCst) {
            return Err(injected("close"));
        }
        Ok(())
    }
}

struct FaultyUpload {
    inner: Box<dyn ObjectUpload>,
    faults: Arc<Faults>,
}

#[async_trait]
impl ObjectUpload for FaultyUpload {
    async fn set_custom_metadata(&mut self, metadata: CustomMetadata) -> StorageResult<()> {
        self.inner.set_custom_metadata(metadata).await
    }

    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        if self.faults.hang_write.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.faults.fail_write.load(Ordering::SeqCst) {
            return Err(injected("write"));
        }
        self.inner.write(data).await
    }

    async fn commit(self: Box<Self>) -> StorageResult<ObjectInfo> {
        self.faults.commits.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            self.inner.abort().await?;
            return Err(injected("commit"));
        }
        self.inner.commit().await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.faults.aborts.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.abort().await;
        if self.faults.fail_abort.load(Ordering::SeqCst) {
            return Err(injected("abort"));
        }
        result
    }
}
