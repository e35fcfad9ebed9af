//! Blob storage for uploaded build artifacts.
//!
//! Backends:
//! - Local filesystem (default): one file per artifact under an upload directory
//! - In-memory: volatile map, also able to inject write/delete failures

mod backend;
mod local;
mod memory;

pub use backend::{BlobError, BlobResult, BlobStore, StoredBlob};
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
