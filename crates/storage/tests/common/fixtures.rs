use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;
use stratum_core::{AccessGrant, EncryptionKey};
use stratum_storage::{FilesystemNetwork, MemoryNetwork, Network, Project};
use tempfile::TempDir;

pub const ROOT_SECRET: &[u8] = b"integration-root-secret";

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// An unrestricted grant for networks built with [`ROOT_SECRET`].
pub fn root_grant() -> AccessGrant {
    AccessGrant::issue("127.0.0.1:7777", ROOT_SECRET, EncryptionKey::from_bytes([7; 32]))
        .expect("issue root grant")
}

/// A network under test. Holds the temp dir alive for filesystem networks.
pub struct TestNetwork {
    pub name: &'static str,
    pub network: Arc<dyn Network>,
    _dir: Option<TempDir>,
}

/// Every backend, so contract tests run against each one.
pub async fn all_networks() -> Vec<TestNetwork> {
    let dir = TempDir::new().unwrap();
    let fs = FilesystemNetwork::new(dir.path(), ROOT_SECRET).await.unwrap();
    vec![
        TestNetwork {
            name: "memory",
            network: Arc::new(MemoryNetwork::new(ROOT_SECRET)),
            _dir: None,
        },
        TestNetwork {
            name: "filesystem",
            network: Arc::new(fs),
            _dir: Some(dir),
        },
    ]
}

pub async fn put(project: &dyn Project, bucket: &str, key: &str, data: Bytes) {
    let mut upload = project.upload_object(bucket, key).await.unwrap();
    upload.write(data).await.unwrap();
    upload.commit().await.unwrap();
}

pub async fn get(project: &dyn Project, bucket: &str, key: &str) -> Bytes {
    let chunks: Vec<Bytes> = project
        .download_object(bucket, key)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    Bytes::from(chunks.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }
}
