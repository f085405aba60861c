//! Scripted input stream

use crate::collaborators::{CacheStatus, DisplayTime, InputStream, MenuNavigator, NextStream, StreamInfo};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Input capabilities as written in a scenario file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimInputSpec {
    pub file_name: String,
    pub realtime: bool,
    pub can_pause: bool,
    pub can_seek: bool,
    pub fail_open: bool,
    /// Inner streams announced after the first one ends
    pub next_streams: u32,
    /// Bytes cached ahead; enables cache metrics when set
    pub cache_forward: Option<u64>,
    pub length: i64,
}

impl Default for SimInputSpec {
    fn default() -> Self {
        Self {
            file_name: "sim://media".to_string(),
            realtime: false,
            can_pause: true,
            can_seek: true,
            fail_open: false,
            next_streams: 0,
            cache_forward: None,
            length: -1,
        }
    }
}

/// Input whose capabilities are fixed at construction
pub struct SimInput {
    spec: SimInputSpec,
    cache: Option<CacheStatus>,
    navigator: Option<Arc<SimNavigator>>,
    display_time: Option<Arc<SimDisplayTime>>,
    aborted: bool,
}

impl SimInput {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self::from_spec(SimInputSpec {
            file_name: file_name.into(),
            ..Default::default()
        })
    }

    pub fn from_spec(spec: SimInputSpec) -> Self {
        let cache = spec.cache_forward.map(|forward| CacheStatus {
            forward,
            current_rate: 0,
            max_rate: 0,
            level: 1.0,
        });
        Self {
            spec,
            cache,
            navigator: None,
            display_time: None,
            aborted: false,
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.spec.realtime = realtime;
        self
    }

    pub fn seekable(mut self, can_seek: bool) -> Self {
        self.spec.can_seek = can_seek;
        self
    }

    pub fn pausable(mut self, can_pause: bool) -> Self {
        self.spec.can_pause = can_pause;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.spec.fail_open = true;
        self
    }

    pub fn with_next_streams(mut self, count: u32) -> Self {
        self.spec.next_streams = count;
        self
    }

    pub fn with_cache(mut self, status: CacheStatus, length: i64) -> Self {
        self.cache = Some(status);
        self.spec.length = length;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<SimNavigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_display_time(mut self, display: Arc<SimDisplayTime>) -> Self {
        self.display_time = Some(display);
        self
    }
}

impl InputStream for SimInput {
    fn open(&mut self) -> Result<()> {
        if self.spec.fail_open {
            return Err(Error::Open(format!("{} cannot be opened", self.spec.file_name)));
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }

    fn file_name(&self) -> String {
        self.spec.file_name.clone()
    }

    fn is_realtime(&self) -> bool {
        self.spec.realtime
    }

    fn can_pause(&self) -> bool {
        self.spec.can_pause
    }

    fn can_seek(&self) -> bool {
        self.spec.can_seek
    }

    fn length(&self) -> i64 {
        self.spec.length
    }

    fn cache_status(&self) -> Option<CacheStatus> {
        self.cache
    }

    fn next_stream(&mut self) -> NextStream {
        if self.spec.next_streams == 0 {
            return NextStream::None;
        }
        self.spec.next_streams -= 1;
        debug!("Input announces a new inner stream, {} left", self.spec.next_streams);
        NextStream::Open
    }

    fn is_eof(&self) -> bool {
        self.aborted
    }

    fn navigator(&mut self) -> Option<Arc<dyn MenuNavigator>> {
        self.navigator.clone().map(|nav| nav as Arc<dyn MenuNavigator>)
    }

    fn display_time(&mut self) -> Option<Arc<dyn DisplayTime>> {
        self.display_time.clone().map(|display| display as Arc<dyn DisplayTime>)
    }
}

#[derive(Debug, Default)]
struct NavigatorState {
    in_menu: bool,
    audio: Vec<StreamInfo>,
    subtitles: Vec<StreamInfo>,
    active_audio: i32,
    active_subtitle: i32,
    subtitles_enabled: bool,
    state: Option<String>,
}

/// Disc navigator with a fixed stream table
///
/// Navigator entries carry their demuxer stream id in `physical_id`.
#[derive(Debug, Default)]
pub struct SimNavigator {
    state: Mutex<NavigatorState>,
}

impl SimNavigator {
    pub fn new(audio: Vec<StreamInfo>, subtitles: Vec<StreamInfo>) -> Self {
        let active_audio = if audio.is_empty() { -1 } else { 0 };
        Self {
            state: Mutex::new(NavigatorState {
                audio,
                subtitles,
                active_audio,
                active_subtitle: -1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NavigatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_in_menu(&self, in_menu: bool) {
        self.lock().in_menu = in_menu;
    }

    fn physical(streams: &[StreamInfo], index: i32) -> i32 {
        usize::try_from(index)
            .ok()
            .and_then(|i| streams.get(i))
            .map_or(-1, |s| s.physical_id)
    }
}

impl MenuNavigator for SimNavigator {
    fn is_in_menu(&self) -> bool {
        self.lock().in_menu
    }

    fn active_audio_stream(&self) -> i32 {
        self.lock().active_audio
    }

    fn active_subtitle_stream(&self) -> i32 {
        self.lock().active_subtitle
    }

    fn set_active_audio_stream(&self, index: i32) -> bool {
        let mut state = self.lock();
        if index < 0 || index as usize >= state.audio.len() {
            return false;
        }
        state.active_audio = index;
        true
    }

    fn set_active_subtitle_stream(&self, index: i32) -> bool {
        let mut state = self.lock();
        if index < 0 || index as usize >= state.subtitles.len() {
            return false;
        }
        state.active_subtitle = index;
        true
    }

    fn physical_audio_id(&self) -> i32 {
        let state = self.lock();
        Self::physical(&state.audio, state.active_audio)
    }

    fn physical_subtitle_id(&self) -> i32 {
        let state = self.lock();
        Self::physical(&state.subtitles, state.active_subtitle)
    }

    fn enable_subtitle_stream(&self, enable: bool) {
        self.lock().subtitles_enabled = enable;
    }

    fn is_subtitle_stream_enabled(&self) -> bool {
        self.lock().subtitles_enabled
    }

    fn audio_streams(&self) -> Vec<StreamInfo> {
        self.lock().audio.clone()
    }

    fn subtitle_streams(&self) -> Vec<StreamInfo> {
        self.lock().subtitles.clone()
    }

    fn get_state(&self) -> Option<String> {
        self.lock().state.clone()
    }

    fn set_state(&self, state: &str) -> bool {
        if state.is_empty() {
            return false;
        }
        self.lock().state = Some(state.to_string());
        true
    }
}

/// Display-time capability whose values are set by hand
#[derive(Debug, Default)]
pub struct SimDisplayTime {
    time_ms: AtomicI64,
    total_ms: AtomicI64,
}

impl SimDisplayTime {
    pub fn new(time_ms: i64, total_ms: i64) -> Self {
        Self {
            time_ms: AtomicI64::new(time_ms),
            total_ms: AtomicI64::new(total_ms),
        }
    }

    pub fn set_time_ms(&self, time_ms: i64) {
        self.time_ms.store(time_ms, Ordering::SeqCst);
    }
}

impl DisplayTime for SimDisplayTime {
    fn time_ms(&self) -> i64 {
        self.time_ms.load(Ordering::SeqCst)
    }

    fn total_time_ms(&self) -> i64 {
        self.total_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_streams_count_down() {
        let mut input = SimInput::new("disc").with_next_streams(2);
        assert_eq!(input.next_stream(), NextStream::Open);
        assert_eq!(input.next_stream(), NextStream::Open);
        assert_eq!(input.next_stream(), NextStream::None);
    }

    #[test]
    fn test_failing_open() {
        let mut input = SimInput::new("broken").failing_open();
        assert!(matches!(input.open(), Err(Error::Open(_))));
    }

    #[test]
    fn test_navigator_maps_physical_ids() {
        let audio = vec![
            StreamInfo {
                id: 0,
                physical_id: 0x80,
                ..Default::default()
            },
            StreamInfo {
                id: 1,
                physical_id: 0x81,
                ..Default::default()
            },
        ];
        let nav = SimNavigator::new(audio, Vec::new());
        assert_eq!(nav.physical_audio_id(), 0x80);
        assert!(nav.set_active_audio_stream(1));
        assert_eq!(nav.physical_audio_id(), 0x81);
        assert!(!nav.set_active_audio_stream(5));
        assert_eq!(nav.physical_subtitle_id(), -1);
    }
}
