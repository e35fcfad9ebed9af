//! Install orchestration.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use appmirror_state::*;

use crate::error::{MirrorError, MirrorResult};
use crate::transitions::TransitionScheduler;

/// Acknowledgement returned as soon as an installation has started.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallReceipt {
    pub message: String,
    pub session_id: SessionId,
    pub build_id: BuildId,
    pub status: SessionStatus,
}

#[derive(Clone)]
pub struct InstallOrchestrator {
    state: StateStore,
    transitions: TransitionScheduler,
    install_delay: Duration,
}

impl InstallOrchestrator {
    pub fn new(state: StateStore, transitions: TransitionScheduler, install_delay: Duration) -> Self {
        Self {
            state,
            transitions,
            install_delay,
        }
    }

    /// Install a build on a ready session.
    ///
    /// Checks run in order: session exists, build exists, platforms agree,
    /// session is `ready`. The status check and the move to `installing`
    /// happen in one store update. The session becomes `running` after the
    /// install delay.
    pub async fn install(&self, session_id: &str, build_id: &str) -> MirrorResult<InstallReceipt> {
        if build_id.trim().is_empty() {
            return Err(MirrorError::MissingField("build_id"));
        }

        let build = self.state.get_build(build_id)?;

        self.state.update_session(session_id, |session| {
            let session =
                session.ok_or_else(|| MirrorError::SessionNotFound(session_id.to_string()))?;
            let build = build
                .as_ref()
                .ok_or_else(|| MirrorError::BuildNotFound(build_id.to_string()))?;

            if build.platform != session.device.platform {
                return Err(MirrorError::PlatformMismatch {
                    build: build.platform,
                    device: session.device.platform,
                });
            }

            let now = Utc::now();
            session
                .advance(SessionStatus::Installing, now)
                .map_err(|e| MirrorError::SessionNotReady { status: e.from })?;
            session.attach_build(build_id, now);
            Ok(())
        })?;

        self.transitions
            .schedule(
                session_id,
                SessionStatus::Installing,
                SessionStatus::Running,
                self.install_delay,
            )
            .await;

        info!(%session_id, %build_id, "installation started");

        Ok(InstallReceipt {
            message: "Installation started".to_string(),
            session_id: session_id.to_string(),
            build_id: build_id.to_string(),
            status: SessionStatus::Installing,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use appmirror_storage::MemoryBlobStore;

    use super::*;
    use crate::intake::BuildIntake;
    use crate::lifecycle::SessionController;

    struct Fixture {
        sessions: SessionController,
        intake: BuildIntake,
        installs: InstallOrchestrator,
        state: StateStore,
    }

    fn fixture() -> Fixture {
        let state = StateStore::open_in_memory().unwrap();
        let transitions = TransitionScheduler::new(state.clone());
        Fixture {
            sessions: SessionController::new(
                state.clone(),
                transitions.clone(),
                Duration::from_secs(3),
            ),
            intake: BuildIntake::new(state.clone(), Arc::new(MemoryBlobStore::new())),
            installs: InstallOrchestrator::new(state.clone(), transitions, Duration::from_secs(5)),
            state,
        }
    }

    async fn ready_session(f: &Fixture, name: &str, os: &str) -> String {
        let id = f.sessions.launch(name, os, None).await.unwrap().session.id;
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(f.sessions.session(&id).unwrap().status, SessionStatus::Ready);
        id
    }

    async fn upload(f: &Fixture, session_id: &str, filename: &str) -> Build {
        f.intake
            .upload(session_id, None, filename, Bytes::from_static(b"artifact"))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn install_moves_to_installing_then_running() {
        let f = fixture();
        let session_id = ready_session(&f, "Pixel 8", "Android 14").await;
        let build = upload(&f, &session_id, "app.apk").await;

        let receipt = f.installs.install(&session_id, &build.id).await.unwrap();
        assert_eq!(receipt.message, "Installation started");
        assert_eq!(receipt.status, SessionStatus::Installing);
        assert_eq!(receipt.build_id, build.id);

        let session = f.sessions.session(&session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Installing);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let session = f.sessions.session(&session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.build_id.as_deref(), Some(build.id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn install_while_preparing_is_rejected() {
        let f = fixture();
        let session_id = f
            .sessions
            .launch("Pixel 8", "Android 14", None)
            .await
            .unwrap()
            .session
            .id;
        let build = upload(&f, &session_id, "app.apk").await;
        let before = f.sessions.session(&session_id).unwrap();

        let err = f.installs.install(&session_id, &build.id).await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::SessionNotReady { status: SessionStatus::Preparing }
        ));
        assert_eq!(err.to_string(), "Device is not ready for installation");
        assert_eq!(f.sessions.session(&session_id).unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn second_install_is_rejected() {
        let f = fixture();
        let session_id = ready_session(&f, "Pixel 8", "Android 14").await;
        let build = upload(&f, &session_id, "app.apk").await;

        f.installs.install(&session_id, &build.id).await.unwrap();
        let err = f.installs.install(&session_id, &build.id).await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::SessionNotReady { status: SessionStatus::Installing }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn platform_mismatch_is_rejected() {
        let f = fixture();
        let ios = ready_session(&f, "iPhone 15", "iOS 17").await;
        let android = ready_session(&f, "Pixel 8", "Android 14").await;
        let apk = upload(&f, &android, "app.apk").await;

        let err = f.installs.install(&ios, &apk.id).await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::PlatformMismatch {
                build: Platform::Android,
                device: Platform::Ios
            }
        ));
        assert_eq!(err.to_string(), "Build platform does not match device platform");
        assert_eq!(f.sessions.session(&ios).unwrap().status, SessionStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_and_build() {
        let f = fixture();
        let session_id = ready_session(&f, "Pixel 8", "Android 14").await;
        let build = upload(&f, &session_id, "app.apk").await;

        assert!(matches!(
            f.installs.install("ghost", &build.id).await,
            Err(MirrorError::SessionNotFound(_))
        ));
        assert!(matches!(
            f.installs.install(&session_id, "ghost").await,
            Err(MirrorError::BuildNotFound(_))
        ));
        assert!(matches!(
            f.installs.install(&session_id, "").await,
            Err(MirrorError::MissingField("build_id"))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn install_records_last_build() {
        let f = fixture();
        let session_id = ready_session(&f, "Pixel 8", "Android 14").await;
        let first = upload(&f, &session_id, "first.apk").await;
        let second = upload(&f, &session_id, "second.apk").await;
        assert_eq!(
            f.state.get_session(&session_id).unwrap().unwrap().build_id.as_deref(),
            Some(second.id.as_str())
        );

        f.installs.install(&session_id, &first.id).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        let session = f.state.get_session(&session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.build_id.as_deref(), Some(first.id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn ending_during_install_stops_the_timer() {
        let f = fixture();
        let session_id = ready_session(&f, "Pixel 8", "Android 14").await;
        let build = upload(&f, &session_id, "app.apk").await;
        f.installs.install(&session_id, &build.id).await.unwrap();

        f.sessions.end(&session_id).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(f.state.get_session(&session_id).unwrap().is_none());
    }
}
