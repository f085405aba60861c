//! Event types for the avlock event bus

use crate::media::StreamType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Player events published to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Input and demuxer opened, default streams selected
    PlaybackStarted {
        session_id: Uuid,
        file_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// First successful audio/video clock synchronization of the session
    AvStarted {
        session_id: Uuid,
        clock_us: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Caching state machine transition
    CachingChanged {
        from: CachingState,
        to: CachingState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback speed changed (thousandths of normal speed)
    SpeedChanged {
        speed: i32,
        is_tempo: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Seek executed by the demuxer
    SeekPerformed {
        time_ms: i64,
        accurate: bool,
        trick_play: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Chapter seek executed
    ChapterSeek {
        chapter: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active stream of a type changed
    StreamSelected {
        stream_type: StreamType,
        type_index: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Subtitle visibility changed
    SubtitleVisibilityChanged {
        visible: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached the end of its input
    PlaybackEnded {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session was aborted by request
    PlaybackStopped {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session terminated by a fatal error
    PlaybackError {
        session_id: Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Caching / buffering state of a playback session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CachingState {
    /// Buffers were just flushed; resolves to Full or Init immediately
    Flush,
    /// Pipelines paused while their queues fill
    Init,
    /// Pipelines paused while the input cache fills
    Full,
    /// Clock running, waiting for every pipeline to produce output
    Play,
    /// Steady state playback
    Done,
}

impl CachingState {
    /// True while playback is held back for buffering
    pub fn is_caching(self) -> bool {
        !matches!(self, CachingState::Done)
    }
}

impl std::fmt::Display for CachingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachingState::Flush => write!(f, "flush"),
            CachingState::Init => write!(f, "init"),
            CachingState::Full => write!(f, "full"),
            CachingState::Play => write!(f, "play"),
            CachingState::Done => write!(f, "done"),
        }
    }
}

/// Terminal outcome of a playback session (reported exactly once)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SessionOutcome {
    Ended,
    Stopped,
    Error { message: String },
}

impl SessionOutcome {
    /// Convert the outcome into its terminal event
    pub fn into_event(self, session_id: Uuid) -> PlayerEvent {
        let timestamp = chrono::Utc::now();
        match self {
            SessionOutcome::Ended => PlayerEvent::PlaybackEnded {
                session_id,
                timestamp,
            },
            SessionOutcome::Stopped => PlayerEvent::PlaybackStopped {
                session_id,
                timestamp,
            },
            SessionOutcome::Error { message } => PlayerEvent::PlaybackError {
                session_id,
                message,
                timestamp,
            },
        }
    }
}

impl PlayerEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PlayerEvent::PlaybackStarted { .. } => "PlaybackStarted",
            PlayerEvent::AvStarted { .. } => "AvStarted",
            PlayerEvent::CachingChanged { .. } => "CachingChanged",
            PlayerEvent::SpeedChanged { .. } => "SpeedChanged",
            PlayerEvent::SeekPerformed { .. } => "SeekPerformed",
            PlayerEvent::ChapterSeek { .. } => "ChapterSeek",
            PlayerEvent::StreamSelected { .. } => "StreamSelected",
            PlayerEvent::SubtitleVisibilityChanged { .. } => "SubtitleVisibilityChanged",
            PlayerEvent::PlaybackEnded { .. } => "PlaybackEnded",
            PlayerEvent::PlaybackStopped { .. } => "PlaybackStopped",
            PlayerEvent::PlaybackError { .. } => "PlaybackError",
        }
    }

    /// True for the three session-terminating events
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlayerEvent::PlaybackEnded { .. }
                | PlayerEvent::PlaybackStopped { .. }
                | PlayerEvent::PlaybackError { .. }
        )
    }
}
