//! Shared session state
//!
//! Thread-safe state shared between the control thread and its readers.
//! The control thread is the only writer; readers always get whole copies.

use crate::playback::snapshot::PlayStateSnapshot;
use crate::streams::SelectionStream;
use avlock_common::events::{PlayerEvent, SessionOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// State shared by the control thread and every handle
///
/// Uses std RwLock: the control thread is synchronous and never holds a lock
/// across a collaborator call.
pub struct SharedState {
    pub session_id: Uuid,

    /// Last published play state
    snapshot: RwLock<PlayStateSnapshot>,

    /// Last published registry copy
    streams: RwLock<Vec<SelectionStream>>,

    /// Event broadcaster
    pub event_tx: broadcast::Sender<PlayerEvent>,

    /// Cooperative abort flag, shared with collaborators
    abort: Arc<AtomicBool>,

    /// Latched once the session outcome has been reported
    outcome_reported: AtomicBool,
    outcome: RwLock<Option<SessionOutcome>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::with_session_id(Uuid::new_v4())
    }

    pub fn with_session_id(session_id: Uuid) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            session_id,
            snapshot: RwLock::new(PlayStateSnapshot::default()),
            streams: RwLock::new(Vec::new()),
            event_tx,
            abort: Arc::new(AtomicBool::new(false)),
            outcome_reported: AtomicBool::new(false),
            outcome: RwLock::new(None),
        }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast_event(&self, event: PlayerEvent) {
        // no receivers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> PlayStateSnapshot {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn publish_snapshot(&self, snapshot: PlayStateSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn streams(&self) -> Vec<SelectionStream> {
        self.streams.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn publish_streams(&self, streams: Vec<SelectionStream>) {
        *self.streams.write().unwrap_or_else(PoisonError::into_inner) = streams;
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Report the session outcome; only the first report is kept
    ///
    /// Returns false when an outcome was already reported.
    pub fn report_outcome(&self, outcome: SessionOutcome) -> bool {
        if self.outcome_reported.swap(true, Ordering::SeqCst) {
            warn!("Session outcome already reported, ignoring {:?}", outcome);
            return false;
        }
        info!("Session {} finished: {:?}", self.session_id, outcome);
        *self.outcome.write().unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        self.broadcast_event(outcome.into_event(self.session_id));
        true
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outcome_reported_once() {
        let state = SharedState::new();
        let mut rx = state.subscribe_events();

        assert!(state.report_outcome(SessionOutcome::Stopped));
        assert!(!state.report_outcome(SessionOutcome::Ended));
        assert_eq!(state.outcome(), Some(SessionOutcome::Stopped));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "PlaybackStopped");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_snapshot_replaced_whole() {
        let state = SharedState::new();
        assert_eq!(state.snapshot().time_ms, 0);

        state.publish_snapshot(PlayStateSnapshot {
            time_ms: 4200,
            can_seek: true,
            ..Default::default()
        });
        let snapshot = state.snapshot();
        assert_eq!(snapshot.time_ms, 4200);
        assert!(snapshot.can_seek);
    }

    #[test]
    fn test_abort_flag_is_shared() {
        let state = SharedState::new();
        let flag = state.abort_flag();
        assert!(!state.is_aborted());
        state.request_abort();
        assert!(flag.load(Ordering::SeqCst));
    }
}
