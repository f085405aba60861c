//! Input stream collaborator and its optional capabilities

use crate::error::Result;
use super::demuxer::StreamInfo;
use std::sync::Arc;

/// Result of asking the input for its next inner stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStream {
    /// No further inner stream; end of input
    None,
    /// A new inner stream is ready; the demuxer must be rebuilt
    Open,
    /// Not ready yet; ask again shortly
    Retry,
}

/// Read-ahead cache metrics of a network input
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStatus {
    /// Bytes cached ahead of the read position
    pub forward: u64,
    /// Current fill rate in bytes per second (0 when unknown)
    pub current_rate: u32,
    /// Maximum observed fill rate in bytes per second
    pub max_rate: u32,
    /// Cache's own rate estimate; negative when the read rate is too low
    pub level: f32,
}

/// Kind of disc menu being shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuType {
    #[default]
    None,
    Native,
}

/// Disc navigator capability (menu-driven sources)
///
/// Obtained once when the input opens. Stream indices are navigator indices;
/// physical ids are the demuxer stream ids the navigator maps them to.
pub trait MenuNavigator: Send + Sync {
    fn is_in_menu(&self) -> bool;

    fn menu_type(&self) -> MenuType {
        MenuType::Native
    }

    /// Navigator index of the active audio stream, -1 for none
    fn active_audio_stream(&self) -> i32;

    /// Navigator index of the active subtitle stream, -1 for none
    fn active_subtitle_stream(&self) -> i32;

    fn set_active_audio_stream(&self, index: i32) -> bool;

    fn set_active_subtitle_stream(&self, index: i32) -> bool;

    /// Demuxer id the navigator currently routes for audio, -1 for none
    fn physical_audio_id(&self) -> i32;

    /// Demuxer id the navigator currently routes for subtitles, -1 for none
    fn physical_subtitle_id(&self) -> i32;

    fn enable_subtitle_stream(&self, enable: bool);

    fn is_subtitle_stream_enabled(&self) -> bool;

    fn audio_streams(&self) -> Vec<StreamInfo>;

    fn subtitle_streams(&self) -> Vec<StreamInfo>;

    /// Opaque navigation state blob
    fn get_state(&self) -> Option<String>;

    fn set_state(&self, state: &str) -> bool;
}

/// Display-time capability (inputs whose timeline differs from the demuxer's)
pub trait DisplayTime: Send + Sync {
    fn time_ms(&self) -> i64;
    fn total_time_ms(&self) -> i64;
}

/// Source of container bytes
pub trait InputStream: Send {
    fn open(&mut self) -> Result<()>;

    /// Unblock any pending read; called from teardown
    fn abort(&mut self);

    fn file_name(&self) -> String;

    /// Live source that cannot be paused for long (broadcast, PVR)
    fn is_realtime(&self) -> bool {
        false
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn can_seek(&self) -> bool {
        true
    }

    /// Total length in bytes, -1 when unknown
    fn length(&self) -> i64 {
        -1
    }

    /// Current read position in bytes
    fn position(&self) -> i64 {
        0
    }

    fn cache_status(&self) -> Option<CacheStatus> {
        None
    }

    fn next_stream(&mut self) -> NextStream {
        NextStream::None
    }

    fn is_eof(&self) -> bool;

    /// Disc navigator capability; queried once at open
    fn navigator(&mut self) -> Option<Arc<dyn MenuNavigator>> {
        None
    }

    /// Display-time capability; queried once at open
    fn display_time(&mut self) -> Option<Arc<dyn DisplayTime>> {
        None
    }
}
