//! appmirror-session: the simulator's behaviour.
//!
//! Three services share one [`StateStore`] and one [`TransitionScheduler`]:
//!
//! - [`SessionController`] launches simulated devices and reports on them.
//! - [`BuildIntake`] accepts, lists and deletes uploaded artifacts.
//! - [`InstallOrchestrator`] starts installations on ready sessions.
//!
//! A session only ever moves `preparing → ready → installing → running`.
//! The `ready` and `running` steps are timed and owned by the scheduler, so
//! ending a session cancels whatever step is still pending.

pub mod error;
pub mod install;
pub mod intake;
pub mod lifecycle;
pub mod transitions;

use std::sync::Arc;
use std::time::Duration;

use appmirror_core::MirrorConfig;
use appmirror_core::config::ConfigError;
use appmirror_state::StateStore;
use appmirror_storage::BlobStore;

pub use error::{ErrorKind, MirrorError, MirrorResult};
pub use install::{InstallOrchestrator, InstallReceipt};
pub use intake::BuildIntake;
pub use lifecycle::{LaunchResult, SessionController, SessionView};
pub use transitions::TransitionScheduler;

/// Delays of the two timed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub ready_delay: Duration,
    pub install_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            ready_delay: Duration::from_secs(3),
            install_delay: Duration::from_secs(5),
        }
    }
}

impl Timings {
    pub fn from_config(config: &MirrorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ready_delay: config.lifecycle.ready_delay()?,
            install_delay: config.lifecycle.install_delay()?,
        })
    }
}

/// All services wired to the same store and scheduler.
#[derive(Clone)]
pub struct MirrorServices {
    pub sessions: SessionController,
    pub builds: BuildIntake,
    pub installs: InstallOrchestrator,
    pub transitions: TransitionScheduler,
}

impl MirrorServices {
    pub fn new(state: StateStore, blobs: Arc<dyn BlobStore>, timings: Timings) -> Self {
        let transitions = TransitionScheduler::new(state.clone());
        Self {
            sessions: SessionController::new(
                state.clone(),
                transitions.clone(),
                timings.ready_delay,
            ),
            builds: BuildIntake::new(state.clone(), blobs),
            installs: InstallOrchestrator::new(state, transitions.clone(), timings.install_delay),
            transitions,
        }
    }

    /// Stop every pending transition.
    pub async fn shutdown(&self) {
        self.transitions.cancel_all().await;
    }
}
