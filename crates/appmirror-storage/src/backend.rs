//! Blob store trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Blob storage errors.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Where a blob ended up and how many bytes were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub location: String,
    pub size: u64,
}

/// Artifact storage collaborator.
///
/// `put` returns an opaque location string; the same string is handed back
/// to `delete`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key` (a single path segment such as `"{id}.ipa"`).
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<StoredBlob>;

    /// Remove a stored blob. Removing a blob that is already gone succeeds.
    async fn delete(&self, location: &str) -> BlobResult<()>;
}

/// Keys become file names, so they must be a single plain segment.
pub(crate) fn validate_key(key: &str) -> BlobResult<()> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}
