//! Session service error types.

use thiserror::Error;

use appmirror_state::{BuildId, Platform, SessionId, SessionStatus, StateError};
use appmirror_storage::BlobError;

/// Coarse error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Storage,
    Internal,
}

/// Errors returned by launch, upload, install and the session queries.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Session not found")]
    SessionNotFound(SessionId),

    #[error("Build not found")]
    BuildNotFound(BuildId),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("No file uploaded")]
    MissingFile,

    #[error("Invalid file type {extension} for {platform} platform")]
    InvalidFileType {
        extension: String,
        platform: Platform,
    },

    #[error("Build platform does not match device platform")]
    PlatformMismatch { build: Platform, device: Platform },

    #[error("Device is not ready for installation")]
    SessionNotReady { status: SessionStatus },

    #[error("Failed to save file")]
    StorageWrite(#[source] BlobError),

    #[error("Failed to delete build file")]
    StorageDelete(#[source] BlobError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl MirrorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::SessionNotFound(_) | MirrorError::BuildNotFound(_) => ErrorKind::NotFound,
            MirrorError::MissingField(_)
            | MirrorError::MissingFile
            | MirrorError::InvalidFileType { .. }
            | MirrorError::PlatformMismatch { .. }
            | MirrorError::SessionNotReady { .. } => ErrorKind::Validation,
            MirrorError::StorageWrite(_) | MirrorError::StorageDelete(_) => ErrorKind::Storage,
            MirrorError::State(_) => ErrorKind::Internal,
        }
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;
