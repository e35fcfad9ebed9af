//! Session lifecycle: launch, status, and teardown of simulated devices.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use appmirror_core::platform::allowed_build_extensions;
use appmirror_state::*;

use crate::error::{MirrorError, MirrorResult};
use crate::transitions::TransitionScheduler;

/// Outcome of a launch: the new session plus what the client may upload.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchResult {
    pub session: Session,
    pub upload_options: Vec<&'static str>,
    pub message: String,
}

/// A session snapshot with its build, when the build still exists.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: Session,
    #[serde(rename = "build_info")]
    pub build: Option<Build>,
}

/// Creates sessions, reports their status, and ends them.
#[derive(Clone)]
pub struct SessionController {
    state: StateStore,
    transitions: TransitionScheduler,
    ready_delay: Duration,
}

impl SessionController {
    pub fn new(state: StateStore, transitions: TransitionScheduler, ready_delay: Duration) -> Self {
        Self {
            state,
            transitions,
            ready_delay,
        }
    }

    /// Launch a simulated device.
    ///
    /// The platform is derived from the device name and OS version;
    /// `platform_hint` is informational only. The session starts in
    /// `preparing` and becomes `ready` after the preparation delay.
    pub async fn launch(
        &self,
        device_name: &str,
        os_version: &str,
        platform_hint: Option<&str>,
    ) -> MirrorResult<LaunchResult> {
        if device_name.trim().is_empty() {
            return Err(MirrorError::MissingField("device_name"));
        }
        if os_version.trim().is_empty() {
            return Err(MirrorError::MissingField("os_version"));
        }

        let platform = Platform::detect(device_name, os_version);
        if let Some(hint) = platform_hint {
            if Platform::parse(hint) != Some(platform) {
                debug!(%device_name, %hint, detected = %platform, "platform hint ignored");
            }
        }

        let now = Utc::now();
        let device = Device {
            id: self.state.generate_id(),
            name: device_name.to_string(),
            platform,
            os_version: os_version.to_string(),
            available: true,
        };
        let session = Session::new(self.state.generate_id(), device.clone(), now);

        self.state.insert_device(&device)?;
        if let Err(e) = self.state.insert_session(&session) {
            self.state.delete_device(&device.id)?;
            return Err(e.into());
        }

        self.transitions
            .schedule(
                &session.id,
                SessionStatus::Preparing,
                SessionStatus::Ready,
                self.ready_delay,
            )
            .await;

        info!(
            session_id = %session.id,
            device = %device_name,
            %platform,
            "device launched"
        );

        Ok(LaunchResult {
            upload_options: allowed_build_extensions(Some(platform)),
            message: format!(
                "Device {device_name} with {os_version} is being prepared. You can now upload your build."
            ),
            session,
        })
    }

    /// Current snapshot of a session.
    pub fn session(&self, session_id: &str) -> MirrorResult<Session> {
        self.state
            .get_session(session_id)?
            .ok_or_else(|| MirrorError::SessionNotFound(session_id.to_string()))
    }

    /// Current snapshot of a session together with its build summary.
    pub fn status(&self, session_id: &str) -> MirrorResult<SessionView> {
        let session = self.session(session_id)?;
        let build = match &session.build_id {
            Some(build_id) => self.state.get_build(build_id)?,
            None => None,
        };
        Ok(SessionView { session, build })
    }

    pub fn list(&self) -> MirrorResult<Vec<Session>> {
        Ok(self.state.list_sessions()?)
    }

    /// End a session: cancel its pending transition and drop its records.
    pub async fn end(&self, session_id: &str) -> MirrorResult<()> {
        let session = self.session(session_id)?;

        let cancelled = self.transitions.cancel(session_id).await;
        self.state.delete_session(session_id)?;
        self.state.delete_device(&session.device.id)?;

        info!(%session_id, status = %session.status, cancelled, "session ended");
        Ok(())
    }
}
