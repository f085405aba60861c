//! Caller-side handle to a running session
//!
//! The handle owns the control thread. Every operation is a message on the
//! engine's inbound queue; only [`PlayerHandle::synchronize`] waits for the
//! engine, and it does so with a timeout.

use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::playback::engine::{PlayerEngine, SessionParts};
use crate::playback::messages::{ControlMessage, ControlReceiver, ControlSender, OpenOptions};
use crate::playback::seek::SeekRequest;
use crate::playback::snapshot::PlayStateSnapshot;
use crate::state::SharedState;
use crate::streams::SelectionStream;
use avlock_common::events::{PlayerEvent, SessionOutcome};
use avlock_common::StreamType;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

pub struct PlayerHandle {
    tx: ControlSender,
    shared: Arc<SharedState>,
    thread: Option<JoinHandle<SessionOutcome>>,
}

impl PlayerHandle {
    /// Start the control thread for one session
    ///
    /// `tx`/`rx` must be the pair the session's pipelines report to.
    pub fn spawn(
        config: PlayerConfig,
        parts: SessionParts,
        shared: Arc<SharedState>,
        tx: ControlSender,
        rx: ControlReceiver,
    ) -> Result<Self> {
        let engine = PlayerEngine::new(config, parts, Arc::clone(&shared), tx.clone(), rx);
        let thread = std::thread::Builder::new()
            .name(format!("avlock-control-{}", shared.session_id))
            .spawn(move || engine.run())?;
        info!("Spawned control thread for session {}", shared.session_id);
        Ok(Self {
            tx,
            shared,
            thread: Some(thread),
        })
    }

    /// Queue any control message
    pub fn send(&self, message: ControlMessage) -> Result<()> {
        let name = message.name();
        self.tx
            .send(message)
            .map_err(|_| Error::ChannelClosed(format!("{} not delivered, session is over", name)))
    }

    pub fn open(&self, options: OpenOptions) -> Result<()> {
        self.send(ControlMessage::Open(options))
    }

    pub fn seek(&self, request: SeekRequest) -> Result<()> {
        self.send(ControlMessage::Seek(request))
    }

    pub fn seek_chapter(&self, chapter: usize) -> Result<()> {
        self.send(ControlMessage::SeekChapter(chapter))
    }

    /// Select a stream by its registry type index
    pub fn set_stream(&self, stream_type: StreamType, type_index: i32) -> Result<()> {
        self.send(ControlMessage::SetStream {
            stream_type,
            type_index,
        })
    }

    pub fn set_subtitle_visible(&self, visible: bool) -> Result<()> {
        self.send(ControlMessage::SetSubtitleVisible(visible))
    }

    /// Restore an opaque navigator state blob
    pub fn set_state(&self, state: impl Into<String>) -> Result<()> {
        self.send(ControlMessage::SetState(state.into()))
    }

    pub fn set_speed(&self, speed: i32, is_tempo: bool) -> Result<()> {
        self.send(ControlMessage::SetSpeed { speed, is_tempo })
    }

    pub fn frame_advance(&self, frames: u32) -> Result<()> {
        self.send(ControlMessage::FrameAdvance(frames))
    }

    pub fn flush(&self) -> Result<()> {
        self.send(ControlMessage::Flush)
    }

    pub fn add_subtitle(&self, path: impl Into<String>) -> Result<()> {
        self.send(ControlMessage::AddSubtitle(path.into()))
    }

    /// Wait until the engine has passed every message sent before this one
    /// and forwarded a synchronization marker to `players`
    pub async fn synchronize(&self, players: Vec<StreamType>, timeout: Duration) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(ControlMessage::Synchronize {
            timeout,
            players,
            ack,
        })?;
        match tokio::time::timeout(timeout, done).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::ChannelClosed("session ended before synchronizing".to_string())),
            Err(_) => Err(Error::Timeout(format!("no synchronization within {:?}", timeout))),
        }
    }

    /// Ask the session to stop; the control thread exits at its next cycle
    pub fn abort(&self) {
        self.shared.request_abort();
        if self.tx.send(ControlMessage::Abort).is_err() {
            debug!("Control thread already gone");
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn snapshot(&self) -> PlayStateSnapshot {
        self.shared.snapshot()
    }

    pub fn streams(&self) -> Vec<SelectionStream> {
        self.shared.streams()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.shared.subscribe_events()
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.shared.outcome()
    }

    /// Wait for the control thread to finish
    pub fn join(mut self) -> Result<SessionOutcome> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| Error::InvalidState("control thread already joined".to_string()))?;
        thread
            .join()
            .map_err(|_| Error::Internal("control thread panicked".to_string()))
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.abort();
        }
    }
}
