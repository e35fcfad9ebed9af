//! Timed session transitions.
//!
//! A `TransitionScheduler` owns one background task per session that, after
//! a delay, moves the session from an expected status to its successor.
//! Tasks are kept in a registry keyed by session id so that ending a session
//! can cancel its pending transition instead of leaving a timer to fire
//! against a deleted record.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use appmirror_state::{SessionStatus, StateError, StateStore};

/// Per-session pending transition.
struct TransitionSlot {
    /// Distinguishes this slot from a later replacement for the same session.
    generation: u64,
    target: SessionStatus,
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Registry of pending delayed transitions.
#[derive(Clone)]
pub struct TransitionScheduler {
    state: StateStore,
    /// Pending transitions: session_id → slot.
    slots: Arc<Mutex<HashMap<String, TransitionSlot>>>,
    generation: Arc<AtomicU64>,
}

impl TransitionScheduler {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            slots: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// After `delay`, move `session_id` from `from` to `to`.
    ///
    /// Replaces (and cancels) any transition already pending for the
    /// session. When the timer fires, the move only happens if the session
    /// still exists and is still in `from`.
    pub async fn schedule(
        &self,
        session_id: &str,
        from: SessionStatus,
        to: SessionStatus,
        delay: Duration,
    ) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Held across spawn + insert so a zero-delay task cannot try to
        // deregister before its slot exists.
        let mut slots = self.slots.lock().await;

        let handle = tokio::spawn({
            let state = self.state.clone();
            let registry = Arc::clone(&self.slots);
            let session_id = session_id.to_string();
            async move {
                run_transition(&state, &session_id, from, to, delay, shutdown_rx).await;

                let mut slots = registry.lock().await;
                if slots
                    .get(&session_id)
                    .is_some_and(|slot| slot.generation == generation)
                {
                    slots.remove(&session_id);
                }
            }
        });

        if let Some(old) = slots.insert(
            session_id.to_string(),
            TransitionSlot {
                generation,
                target: to,
                handle,
                shutdown_tx,
            },
        ) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
            debug!(%session_id, replaced = %old.target, "pending transition replaced");
        }

        debug!(%session_id, %from, %to, ?delay, "transition scheduled");
    }

    /// Cancel the pending transition of a session. Returns true if one was pending.
    pub async fn cancel(&self, session_id: &str) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.remove(session_id) {
            Some(slot) => {
                let _ = slot.shutdown_tx.send(true);
                slot.handle.abort();
                info!(%session_id, target = %slot.target, "pending transition cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel everything (for graceful shutdown).
    pub async fn cancel_all(&self) {
        let mut slots = self.slots.lock().await;
        for (session_id, slot) in slots.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(%session_id, "pending transition cancelled");
        }
        info!("all pending transitions cancelled");
    }

    /// Session ids with a pending transition.
    pub async fn pending(&self) -> Vec<String> {
        let slots = self.slots.lock().await;
        slots.keys().cloned().collect()
    }
}

/// Wait out the delay (or a cancellation), then apply the move.
async fn run_transition(
    state: &StateStore,
    session_id: &str,
    from: SessionStatus,
    to: SessionStatus,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {
            match apply_transition(state, session_id, from, to) {
                Ok(true) => info!(%session_id, %from, %to, "session transitioned"),
                Ok(false) => debug!(%session_id, %to, "transition skipped"),
                Err(e) => error!(%session_id, error = %e, "failed to apply transition"),
            }
        }
        _ = shutdown.changed() => {
            debug!(%session_id, %to, "transition cancelled before firing");
        }
    }
}

/// Move the session if it still exists and is still in `from`.
///
/// Returns whether the session changed. A missing session is not an error.
fn apply_transition(
    state: &StateStore,
    session_id: &str,
    from: SessionStatus,
    to: SessionStatus,
) -> Result<bool, StateError> {
    state.update_session(session_id, |session| {
        let Some(session) = session else {
            return Ok(false);
        };
        if session.status != from {
            return Ok(false);
        }
        match session.advance(to, Utc::now()) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(%session_id, error = %e, "transition rejected");
                Ok(false)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use appmirror_state::{Device, Platform, Session};

    fn store_with_session(id: &str) -> StateStore {
        let state = StateStore::open_in_memory().unwrap();
        let device = Device {
            id: format!("{id}-device"),
            name: "Pixel 8".to_string(),
            platform: Platform::Android,
            os_version: "Android 14".to_string(),
            available: true,
        };
        state
            .insert_session(&Session::new(id.to_string(), device, Utc::now()))
            .unwrap();
        state
    }

    fn status_of(state: &StateStore, id: &str) -> SessionStatus {
        state.get_session(id).unwrap().unwrap().status
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay_and_deregisters() {
        let state = store_with_session("s-1");
        let scheduler = TransitionScheduler::new(state.clone());

        scheduler
            .schedule("s-1", SessionStatus::Preparing, SessionStatus::Ready, Duration::from_secs(3))
            .await;
        assert_eq!(scheduler.pending().await, vec!["s-1".to_string()]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(status_of(&state, "s-1"), SessionStatus::Preparing);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(status_of(&state, "s-1"), SessionStatus::Ready);
        assert!(scheduler.pending().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_pending_transition() {
        let state = store_with_session("s-1");
        let scheduler = TransitionScheduler::new(state.clone());

        scheduler
            .schedule("s-1", SessionStatus::Preparing, SessionStatus::Ready, Duration::from_secs(3))
            .await;
        assert!(scheduler.cancel("s-1").await);
        assert!(!scheduler.cancel("s-1").await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(status_of(&state, "s-1"), SessionStatus::Preparing);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_session_is_a_no_op() {
        let state = store_with_session("s-1");
        let scheduler = TransitionScheduler::new(state.clone());

        scheduler
            .schedule("s-1", SessionStatus::Preparing, SessionStatus::Ready, Duration::from_secs(1))
            .await;
        state.delete_session("s-1").unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(state.get_session("s-1").unwrap().is_none());
        assert!(scheduler.pending().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_source_status_is_a_no_op() {
        let state = store_with_session("s-1");
        let scheduler = TransitionScheduler::new(state.clone());

        // Session is preparing, not installing.
        scheduler
            .schedule("s-1", SessionStatus::Installing, SessionStatus::Running, Duration::ZERO)
            .await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(status_of(&state, "s-1"), SessionStatus::Preparing);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_previous_slot() {
        let state = store_with_session("s-1");
        let scheduler = TransitionScheduler::new(state.clone());

        scheduler
            .schedule("s-1", SessionStatus::Preparing, SessionStatus::Ready, Duration::from_secs(60))
            .await;
        scheduler
            .schedule("s-1", SessionStatus::Preparing, SessionStatus::Ready, Duration::from_secs(1))
            .await;
        assert_eq!(scheduler.pending().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(status_of(&state, "s-1"), SessionStatus::Ready);
        assert!(scheduler.pending().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_registry() {
        let state = store_with_session("s-1");
        let scheduler = TransitionScheduler::new(state.clone());

        scheduler
            .schedule("s-1", SessionStatus::Preparing, SessionStatus::Ready, Duration::from_secs(5))
            .await;
        scheduler
            .schedule("s-2", SessionStatus::Preparing, SessionStatus::Ready, Duration::from_secs(5))
            .await;

        scheduler.cancel_all().await;
        assert!(scheduler.pending().await.is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(status_of(&state, "s-1"), SessionStatus::Preparing);
    }

    #[test]
    fn apply_transition_checks_source() {
        let state = store_with_session("s-1");

        assert!(!apply_transition(&state, "s-1", SessionStatus::Ready, SessionStatus::Installing).unwrap());
        assert!(apply_transition(&state, "s-1", SessionStatus::Preparing, SessionStatus::Ready).unwrap());
        assert!(!apply_transition(&state, "s-1", SessionStatus::Preparing, SessionStatus::Ready).unwrap());
        assert!(!apply_transition(&state, "ghost", SessionStatus::Preparing, SessionStatus::Ready).unwrap());
    }
}
