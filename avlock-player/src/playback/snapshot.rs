//! Published play state

use crate::collaborators::MenuType;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterInfo {
    pub name: String,
    pub start_ms: i64,
}

/// Read-mostly copy of the session's playback metrics
///
/// Rebuilt by the control thread and replaced as a whole; readers get a clone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayStateSnapshot {
    /// Last demuxed dts on the corrected timeline (microseconds)
    pub dts: Option<i64>,
    /// Playback time in milliseconds, cuts removed
    pub time_ms: i64,
    pub time_min_ms: i64,
    pub time_max_ms: i64,
    /// Media time at the start of the timeline
    pub start_time_ms: i64,
    /// Time reported by the input's display-time capability
    pub disp_time_ms: Option<i64>,
    /// Offset between clock and media time (microseconds)
    pub time_offset: i64,

    pub chapters: Vec<ChapterInfo>,
    /// Current chapter, 1-based; 0 without chapters
    pub chapter: usize,

    pub can_pause: bool,
    pub can_seek: bool,
    pub can_tempo: bool,
    pub is_in_menu: bool,
    pub menu_type: MenuType,

    pub caching: bool,
    /// Seconds of extra caching needed
    pub cache_delay: f64,
    pub cache_level: f64,
    pub cache_offset: f64,
    /// Media queued in the pipelines (seconds)
    pub cache_time: f64,
    pub cache_bytes: u64,

    pub player_state: Option<String>,
    pub speed: i32,
    pub subtitles_visible: bool,
    pub has_video: bool,
    pub has_audio: bool,
    /// Wall-clock time of the rebuild
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Default for PlayStateSnapshot {
    fn default() -> Self {
        Self {
            dts: None,
            time_ms: 0,
            time_min_ms: 0,
            time_max_ms: 0,
            start_time_ms: 0,
            disp_time_ms: None,
            time_offset: 0,
            chapters: Vec::new(),
            chapter: 0,
            can_pause: false,
            can_seek: false,
            can_tempo: false,
            is_in_menu: false,
            menu_type: MenuType::None,
            caching: false,
            cache_delay: 0.0,
            cache_level: 0.0,
            cache_offset: 0.0,
            cache_time: 0.0,
            cache_bytes: 0,
            player_state: None,
            speed: 0,
            subtitles_visible: false,
            has_video: false,
            has_audio: false,
            timestamp: chrono::Utc::now(),
        }
    }
}
