//! In-memory blob backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::backend::{BlobError, BlobResult, BlobStore, StoredBlob, validate_key};

const SCHEME: &str = "memory://";

/// Volatile blob store. Failures can be switched on to exercise error paths.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete` fail.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    pub async fn get(&self, location: &str) -> Option<Bytes> {
        self.blobs.read().await.get(location).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<StoredBlob> {
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("writes disabled".to_string()));
        }
        let location = format!("{SCHEME}{key}");
        let size = data.len() as u64;
        self.blobs.write().await.insert(location.clone(), data);
        Ok(StoredBlob { location, size })
    }

    async fn delete(&self, location: &str) -> BlobResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("deletes disabled".to_string()));
        }
        self.blobs.write().await.remove(location);
        Ok(())
    }
}
