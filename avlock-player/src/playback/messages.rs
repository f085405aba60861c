//! Inbound control protocol
//!
//! Every external request and every pipeline notification reaches the control
//! thread as a [`ControlMessage`] on one ordered queue.

use super::cursor::SyncState;
use super::edl::EditDecisionList;
use super::seek::SeekRequest;
use avlock_common::{StreamType, Timestamp};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Options of the session-opening message
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Resume position in milliseconds on the cut timeline
    pub start_time_ms: Option<i64>,
    pub edl: Option<EditDecisionList>,
    /// Navigator state blob to restore
    pub player_state: Option<String>,
    /// External subtitle files to register at open
    pub subtitle_files: Vec<String>,
}

#[derive(Debug)]
pub enum ControlMessage {
    Open(OpenOptions),
    Seek(SeekRequest),
    /// Seek to a chapter (1-based)
    SeekChapter(usize),
    /// Make the stream at `type_index` the active one of `stream_type`
    SetStream {
        stream_type: StreamType,
        type_index: i32,
    },
    SetSubtitleVisible(bool),
    /// Restore a navigator state blob
    SetState(String),
    SetSpeed {
        speed: i32,
        is_tempo: bool,
    },
    FrameAdvance(u32),
    /// Flush pipelines without seeking
    Flush,
    /// Barrier: acknowledged once messages queued before it are handled
    Synchronize {
        timeout: Duration,
        players: Vec<StreamType>,
        ack: oneshot::Sender<()>,
    },
    /// A pipeline produced its first output
    PipelineStarted {
        player: StreamType,
        timestamp: Option<Timestamp>,
        cache_time: Timestamp,
        cache_total: Timestamp,
    },
    /// A pipeline reports a sync state change on its own
    PipelineState {
        player: StreamType,
        sync_state: SyncState,
    },
    AddSubtitle(String),
    Abort,
}

impl ControlMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ControlMessage::Open(_) => "Open",
            ControlMessage::Seek(_) => "Seek",
            ControlMessage::SeekChapter(_) => "SeekChapter",
            ControlMessage::SetStream { .. } => "SetStream",
            ControlMessage::SetSubtitleVisible(_) => "SetSubtitleVisible",
            ControlMessage::SetState(_) => "SetState",
            ControlMessage::SetSpeed { .. } => "SetSpeed",
            ControlMessage::FrameAdvance(_) => "FrameAdvance",
            ControlMessage::Flush => "Flush",
            ControlMessage::Synchronize { .. } => "Synchronize",
            ControlMessage::PipelineStarted { .. } => "PipelineStarted",
            ControlMessage::PipelineState { .. } => "PipelineState",
            ControlMessage::AddSubtitle(_) => "AddSubtitle",
            ControlMessage::Abort => "Abort",
        }
    }

    /// Seeks that a newer seek makes obsolete
    pub fn is_seek(&self) -> bool {
        matches!(self, ControlMessage::Seek(_) | ControlMessage::SeekChapter(_))
    }
}

pub type ControlSender = mpsc::UnboundedSender<ControlMessage>;
pub type ControlReceiver = mpsc::UnboundedReceiver<ControlMessage>;

pub fn control_channel() -> (ControlSender, ControlReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_keep_order() {
        let (tx, mut rx) = control_channel();
        tx.send(ControlMessage::Seek(SeekRequest::to(1000))).unwrap();
        tx.send(ControlMessage::SeekChapter(2)).unwrap();
        tx.send(ControlMessage::Abort).unwrap();

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok()).map(|m| m.name()).collect();
        assert_eq!(names, vec!["Seek", "SeekChapter", "Abort"]);
    }

    #[test]
    fn test_seek_classification() {
        assert!(ControlMessage::Seek(SeekRequest::to(0)).is_seek());
        assert!(ControlMessage::SeekChapter(1).is_seek());
        assert!(!ControlMessage::Flush.is_seek());
    }
}
