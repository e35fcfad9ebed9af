//! Local filesystem blob backend.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::backend::{BlobError, BlobResult, BlobStore, StoredBlob, validate_key};

/// Stores every blob as `{root}/{key}`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a location handed out by `put`, refusing anything outside the root.
    fn resolve(&self, location: &str) -> BlobResult<PathBuf> {
        let path = PathBuf::from(location);
        let inside = path.parent() == Some(self.root.as_path())
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| validate_key(n).is_ok());
        if !inside {
            return Err(BlobError::InvalidKey(location.to_string()));
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<StoredBlob> {
        validate_key(key)?;
        fs::create_dir_all(&self.root).await?;

        let path = self.root.join(key);
        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        let size = file.metadata().await?.len();

        debug!(path = ?path, size, "blob written");
        Ok(StoredBlob {
            location: path.to_string_lossy().into_owned(),
            size,
        })
    }

    async fn delete(&self, location: &str) -> BlobResult<()> {
        let path = self.resolve(location)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "blob removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}
