//! Build intake: validate, store, list and delete uploaded artifacts.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use appmirror_core::platform::{is_valid_build_extension, split_filename};
use appmirror_state::*;
use appmirror_storage::BlobStore;

use crate::error::{MirrorError, MirrorResult};

/// Version reported for every uploaded build. Artifacts are not inspected.
pub const DEFAULT_BUILD_VERSION: &str = "1.0.0";

#[derive(Clone)]
pub struct BuildIntake {
    state: StateStore,
    blobs: Arc<dyn BlobStore>,
}

impl BuildIntake {
    pub fn new(state: StateStore, blobs: Arc<dyn BlobStore>) -> Self {
        Self { state, blobs }
    }

    /// Accept an artifact for a session.
    ///
    /// The artifact must carry an extension allowed for the session's
    /// device platform. The blob is written first; the build record only
    /// exists once its bytes do. On success the session points at the new
    /// build.
    pub async fn upload(
        &self,
        session_id: &str,
        platform_hint: Option<&str>,
        filename: &str,
        content: Bytes,
    ) -> MirrorResult<Build> {
        if session_id.trim().is_empty() {
            return Err(MirrorError::MissingField("Session ID"));
        }
        let session = self
            .state
            .get_session(session_id)?
            .ok_or_else(|| MirrorError::SessionNotFound(session_id.to_string()))?;

        let platform = session.device.platform;
        if let Some(hint) = platform_hint.filter(|h| !h.is_empty()) {
            debug!(%session_id, %hint, device_platform = %platform, "upload platform hint ignored");
        }

        let (name, extension) = split_filename(filename);
        if !is_valid_build_extension(&extension, Some(platform)) {
            return Err(MirrorError::InvalidFileType {
                extension,
                platform,
            });
        }

        let build_id = self.state.generate_id();
        // The blob key derives from the id; never overwrite another build's bytes.
        if self.state.get_build(&build_id)?.is_some() {
            warn!(%build_id, "generated build id already in use");
            return Err(StateError::AlreadyExists(build_id).into());
        }
        let stored = self
            .blobs
            .put(&format!("{build_id}{extension}"), content)
            .await
            .map_err(MirrorError::StorageWrite)?;

        let build = Build {
            id: build_id,
            name: name.to_string(),
            platform,
            version: DEFAULT_BUILD_VERSION.to_string(),
            size_bytes: stored.size,
            storage_location: stored.location,
            uploaded_at: Utc::now(),
            compatible: true,
        };

        if let Err(e) = self.state.insert_build(&build) {
            if let Err(cleanup) = self.blobs.delete(&build.storage_location).await {
                warn!(
                    build_id = %build.id,
                    location = %build.storage_location,
                    error = %cleanup,
                    "failed to remove orphaned blob"
                );
            }
            return Err(e.into());
        }

        let attached = self.state.update_session(session_id, |session| {
            Ok::<_, StateError>(match session {
                Some(session) => {
                    session.attach_build(&build.id, Utc::now());
                    true
                }
                None => false,
            })
        })?;
        if !attached {
            warn!(%session_id, build_id = %build.id, "session ended during upload");
        }

        info!(
            %session_id,
            build_id = %build.id,
            %platform,
            size = build.size_bytes,
            "build uploaded"
        );
        Ok(build)
    }

    /// Builds in upload order, optionally restricted to one platform.
    ///
    /// The filter is an exact lower-case platform name; anything else
    /// matches no build. An empty filter is the same as none.
    pub fn list(&self, platform_filter: Option<&str>) -> MirrorResult<Vec<Build>> {
        let filter = match platform_filter.filter(|f| !f.is_empty()) {
            None => None,
            Some(raw) => match Platform::parse(raw).filter(|p| p.as_str() == raw) {
                Some(platform) => Some(platform),
                None => return Ok(Vec::new()),
            },
        };
        Ok(self.state.list_builds(filter)?)
    }

    pub fn get(&self, build_id: &str) -> MirrorResult<Build> {
        self.state
            .get_build(build_id)?
            .ok_or_else(|| MirrorError::BuildNotFound(build_id.to_string()))
    }

    /// Remove a build and its artifact. If the artifact cannot be removed
    /// the record is kept.
    pub async fn delete(&self, build_id: &str) -> MirrorResult<()> {
        let build = self.get(build_id)?;

        self.blobs
            .delete(&build.storage_location)
            .await
            .map_err(MirrorError::StorageDelete)?;
        self.state.delete_build(build_id)?;

        info!(%build_id, location = %build.storage_location, "build deleted");
        Ok(())
    }
}
