//! Caching / buffering state machine
//!
//! ```text
//!  FLUSH ──► FULL ──► INIT ──► PLAY ──► DONE
//!    │                 ▲                 │
//!    └─────────────────┘ (no metrics)    └─► FULL on stall (seekable sources)
//! ```
//!
//! The machine only decides. Pausing the clock and pipelines on a transition
//! is done by the engine when it commits the new state.

use super::cursor::SyncState;
use crate::collaborators::CacheStatus;
use crate::config::SyncTuning;
use avlock_common::timing::{msec_to_time, Timestamp, PLAYSPEED_NORMAL, TIME_BASE};
use avlock_common::CachingState;
use tracing::debug;

/// Caching-relevant view of one audio or video pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineView {
    /// A stream of this type is active
    pub enabled: bool,
    pub sync_state: SyncState,
    pub inited: bool,
    pub accepts_data: bool,
    pub level: i32,
    pub stalled: bool,
}

impl PipelineView {
    pub fn absent() -> Self {
        Self {
            enabled: false,
            sync_state: SyncState::Starting,
            inited: false,
            accepts_data: true,
            level: 0,
            stalled: true,
        }
    }

    fn starting(&self) -> bool {
        self.enabled && self.sync_state == SyncState::Starting
    }
}

/// Inputs of one caching evaluation
#[derive(Debug, Clone, Copy)]
pub struct CachingInputs {
    pub now: Timestamp,
    pub in_menu: bool,
    /// Runway level from the input cache metrics, `None` without metrics
    pub cache_level: Option<f64>,
    pub audio: PipelineView,
    pub video: PipelineView,
}

/// Inputs of the steady-state stall check
#[derive(Debug, Clone, Copy)]
pub struct StallInputs {
    pub speed: i32,
    pub in_menu: bool,
    pub realtime: bool,
    /// The resync cooldown has elapsed
    pub cooldown_elapsed: bool,
    pub speed_adjust: f64,
    pub audio: PipelineView,
    pub video: PipelineView,
}

/// Corrective action decided in DONE
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StallAction {
    None,
    /// Realtime source ran dry: flush and resync in place
    FlushResync,
    /// Both queues low: go back to FULL
    CacheFull,
    /// Audio ran dry: accurate seek to the current time
    ResyncSeek,
    /// New clock speed adjust for a live source
    SpeedAdjust(f64),
}

#[derive(Debug)]
pub struct CachingMachine {
    state: CachingState,
    refusal_since: Option<Timestamp>,
    refusal_timeout: Timestamp,
    stall_level: i32,
    live_low_level: i32,
    live_high_level: i32,
    live_speed_adjust: f64,
}

impl CachingMachine {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self {
            state: CachingState::Done,
            refusal_since: None,
            refusal_timeout: msec_to_time(tuning.init_refusal_timeout_ms),
            stall_level: tuning.stall_level_percent,
            live_low_level: tuning.live_low_level_percent,
            live_high_level: tuning.live_high_level_percent,
            live_speed_adjust: tuning.live_speed_adjust,
        }
    }

    pub fn state(&self) -> CachingState {
        self.state
    }

    /// FLUSH never persists: it resolves to FULL when the input reports
    /// cache metrics and to INIT otherwise
    pub fn resolve(requested: CachingState, has_metrics: bool) -> CachingState {
        match requested {
            CachingState::Flush if has_metrics => CachingState::Full,
            CachingState::Flush => CachingState::Init,
            other => other,
        }
    }

    /// Commit `to`, returning the previous state if it changed
    pub fn transition(&mut self, to: CachingState) -> Option<CachingState> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        debug!("Caching state {} -> {}", from, to);
        self.state = to;
        self.refusal_since = None;
        Some(from)
    }

    /// State the inputs call for, if different from the current one
    pub fn next_state(&mut self, inputs: &CachingInputs) -> Option<CachingState> {
        if inputs.in_menu {
            return (self.state != CachingState::Done).then_some(CachingState::Done);
        }

        let audio = &inputs.audio;
        let video = &inputs.video;
        match self.state {
            CachingState::Full => match inputs.cache_level {
                Some(level) if level >= 1.0 || level < 0.0 => Some(CachingState::Init),
                Some(_) => None,
                None => {
                    let refusing = (audio.enabled && !audio.accepts_data) || (video.enabled && !video.accepts_data);
                    refusing.then_some(CachingState::Init)
                }
            },
            CachingState::Init => {
                if (audio.enabled || video.enabled) && !audio.starting() && !video.starting() {
                    return Some(CachingState::Play);
                }

                // one side is full while the other has produced nothing yet
                let refusing = audio.enabled
                    && video.enabled
                    && ((!audio.accepts_data && video.starting()) || (!video.accepts_data && audio.starting()));
                if !refusing {
                    self.refusal_since = None;
                    return None;
                }
                let since = *self.refusal_since.get_or_insert(inputs.now);
                if inputs.now - since >= self.refusal_timeout {
                    debug!("Pipeline refuses data while its counterpart is still starting");
                    return Some(CachingState::Done);
                }
                None
            }
            CachingState::Play => {
                let audio_ok = !audio.enabled || !audio.stalled;
                let video_ok = !video.enabled || !video.stalled;
                (audio_ok && video_ok).then_some(CachingState::Done)
            }
            CachingState::Flush | CachingState::Done => None,
        }
    }

    /// Stall recovery and live clock nudging while in DONE
    pub fn stall_action(&self, inputs: &StallInputs) -> StallAction {
        if self.state != CachingState::Done || inputs.speed != PLAYSPEED_NORMAL || inputs.in_menu {
            return StallAction::None;
        }
        let audio = &inputs.audio;
        let video = &inputs.video;

        let stalled = (audio.enabled && audio.stalled) || (video.enabled && video.stalled);
        if stalled && inputs.cooldown_elapsed {
            let audio_in_sync = audio.enabled && audio.sync_state == SyncState::InSync;
            let video_in_sync = video.enabled && video.sync_state == SyncState::InSync;
            if inputs.realtime {
                if (audio_in_sync && audio.level == 0) || (video_in_sync && video.level == 0) {
                    return StallAction::FlushResync;
                }
            } else if audio.level <= self.stall_level && video.level <= self.stall_level {
                return StallAction::CacheFull;
            } else if audio_in_sync && audio.inited && audio.level == 0 {
                return StallAction::ResyncSeek;
            }
            return StallAction::None;
        }

        if !stalled && inputs.realtime && audio.enabled {
            if inputs.speed_adjust >= 0.0 && audio.level < self.live_low_level {
                return StallAction::SpeedAdjust(self.live_speed_adjust);
            }
            if inputs.speed_adjust < 0.0 && audio.level > self.live_high_level {
                return StallAction::SpeedAdjust(0.0);
            }
        }
        StallAction::None
    }
}

/// Cache runway metrics derived from the input's cache status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachingTimes {
    /// 1.0 once the cache can outrun playback; -1 when the read rate is too low
    pub level: f64,
    /// Seconds of extra caching needed before playback can run uninterrupted
    pub delay: f64,
    /// Cached fraction of the input ahead of the read position
    pub offset: f64,
}

/// Project the cache runway
///
/// `length`/`position` are input bytes, `stream_length_ms` the media
/// duration and `queue_time_ms` the media already queued in the pipelines.
/// Returns `None` when the input cannot support the projection.
pub fn caching_times(
    status: &CacheStatus,
    length: i64,
    position: i64,
    stream_length_ms: i64,
    queue_time_ms: i64,
) -> Option<CachingTimes> {
    let remain = length - position;
    if length <= 0 || remain < 0 || stream_length_ms <= 0 {
        return None;
    }
    let length = length as f64;
    let remain = remain as f64;
    let cached = status.forward as f64;

    // microseconds of media per byte
    let play_sbp = msec_to_time(stream_length_ms) as f64 / length;
    let queued = msec_to_time(queue_time_ms) as f64 / play_sbp;
    let offset = (cached + queued) / length;

    if status.current_rate == 0 {
        return Some(CachingTimes { level: 0.0, delay: 0.0, offset });
    }

    // underestimate the fill rate by 10%
    let cache_sbp = 1.1 * TIME_BASE as f64 / status.current_rate as f64;
    let play_left = play_sbp * (remain + queued);
    let cache_left = cache_sbp * (remain - cached);
    let cache_need = (remain - play_left / cache_sbp).max(0.0);

    let level = if status.level < 0.0 {
        -1.0
    } else {
        (cached + queued) / (cache_need + queued)
    };
    Some(CachingTimes {
        level,
        delay: (cache_left - play_left) / TIME_BASE as f64,
        offset,
    })
}

/// Media queued in the pipelines estimated from their fill levels
pub fn queue_time_ms(audio_level: i32, video_level: i32, runway_ms: i64) -> i64 {
    audio_level.max(video_level).clamp(0, 100) as i64 * runway_ms / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(sync_state: SyncState) -> PipelineView {
        PipelineView {
            enabled: true,
            sync_state,
            inited: true,
            accepts_data: true,
            level: 60,
            stalled: false,
        }
    }

    fn inputs(audio: PipelineView, video: PipelineView) -> CachingInputs {
        CachingInputs {
            now: 0,
            in_menu: false,
            cache_level: None,
            audio,
            video,
        }
    }

    fn machine(state: CachingState) -> CachingMachine {
        let mut machine = CachingMachine::new(&SyncTuning::default());
        machine.transition(state);
        machine
    }

    #[test]
    fn test_flush_without_metrics_reaches_done() {
        let mut machine = machine(CachingState::Done);
        let target = CachingMachine::resolve(CachingState::Flush, false);
        assert_eq!(target, CachingState::Init);
        assert_eq!(machine.transition(target), Some(CachingState::Done));

        let starting = inputs(view(SyncState::Starting), view(SyncState::Starting));
        assert_eq!(machine.next_state(&starting), None);

        let started = inputs(view(SyncState::WaitSync), view(SyncState::InSync));
        assert_eq!(machine.next_state(&started), Some(CachingState::Play));
        machine.transition(CachingState::Play);

        let mut stalled = started;
        stalled.video.stalled = true;
        assert_eq!(machine.next_state(&stalled), None);
        assert_eq!(machine.next_state(&started), Some(CachingState::Done));
    }

    #[test]
    fn test_flush_with_metrics_goes_full() {
        assert_eq!(CachingMachine::resolve(CachingState::Flush, true), CachingState::Full);
        assert_eq!(CachingMachine::resolve(CachingState::Play, true), CachingState::Play);
    }

    #[test]
    fn test_full_leaves_on_level_or_refusal() {
        let mut machine = machine(CachingState::Full);
        let mut input = inputs(view(SyncState::Starting), view(SyncState::Starting));
        input.cache_level = Some(0.4);
        assert_eq!(machine.next_state(&input), None);
        input.cache_level = Some(1.0);
        assert_eq!(machine.next_state(&input), Some(CachingState::Init));
        input.cache_level = Some(-1.0);
        assert_eq!(machine.next_state(&input), Some(CachingState::Init));

        input.cache_level = None;
        assert_eq!(machine.next_state(&input), None);
        input.audio.accepts_data = false;
        assert_eq!(machine.next_state(&input), Some(CachingState::Init));
    }

    #[test]
    fn test_init_gives_up_after_refusal_timeout() {
        let mut machine = machine(CachingState::Init);
        let mut input = inputs(view(SyncState::WaitSync), view(SyncState::Starting));
        input.audio.accepts_data = false;
        assert_eq!(machine.next_state(&input), None);
        input.now = msec_to_time(1999);
        assert_eq!(machine.next_state(&input), None);
        input.now = msec_to_time(2000);
        assert_eq!(machine.next_state(&input), Some(CachingState::Done));
    }

    #[test]
    fn test_init_keeps_waiting_while_counterpart_waits_for_sync() {
        let mut machine = machine(CachingState::Init);
        let mut input = inputs(view(SyncState::Starting), view(SyncState::WaitSync));
        input.audio.accepts_data = false;
        assert_eq!(machine.next_state(&input), None);
        input.now = msec_to_time(5000);
        assert_eq!(machine.next_state(&input), None);

        // the video side refusing while audio is still starting does give up
        input.audio.accepts_data = true;
        input.video.accepts_data = false;
        assert_eq!(machine.next_state(&input), None);
        input.now = msec_to_time(7000);
        assert_eq!(machine.next_state(&input), Some(CachingState::Done));
    }

    #[test]
    fn test_init_needs_an_enabled_stream_to_play() {
        let mut machine = machine(CachingState::Init);
        let input = inputs(PipelineView::absent(), PipelineView::absent());
        assert_eq!(machine.next_state(&input), None);

        let video_only = inputs(PipelineView::absent(), view(SyncState::WaitSync));
        assert_eq!(machine.next_state(&video_only), Some(CachingState::Play));
    }

    #[test]
    fn test_menu_forces_done() {
        let mut machine = machine(CachingState::Full);
        let mut input = inputs(view(SyncState::Starting), PipelineView::absent());
        input.in_menu = true;
        assert_eq!(machine.next_state(&input), Some(CachingState::Done));
    }

    fn stall(realtime: bool, audio: PipelineView, video: PipelineView) -> StallInputs {
        StallInputs {
            speed: PLAYSPEED_NORMAL,
            in_menu: false,
            realtime,
            cooldown_elapsed: true,
            speed_adjust: 0.0,
            audio,
            video,
        }
    }

    #[test]
    fn test_seekable_stall_recovery() {
        let machine = machine(CachingState::Done);
        let mut audio = view(SyncState::InSync);
        let mut video = view(SyncState::InSync);
        assert_eq!(machine.stall_action(&stall(false, audio, video)), StallAction::None);

        audio.stalled = true;
        audio.level = 0;
        video.level = 40;
        assert_eq!(machine.stall_action(&stall(false, audio, video)), StallAction::CacheFull);

        video.level = 90;
        assert_eq!(machine.stall_action(&stall(false, audio, video)), StallAction::ResyncSeek);

        let mut cooling = stall(false, audio, video);
        cooling.cooldown_elapsed = false;
        assert_eq!(machine.stall_action(&cooling), StallAction::None);
    }

    #[test]
    fn test_realtime_stall_and_speed_adjust() {
        let machine = machine(CachingState::Done);
        let mut audio = view(SyncState::InSync);
        let video = view(SyncState::InSync);

        audio.level = 3;
        assert_eq!(machine.stall_action(&stall(true, audio, video)), StallAction::SpeedAdjust(-0.01));

        let mut slowed = stall(true, audio, video);
        slowed.speed_adjust = -0.01;
        assert_eq!(machine.stall_action(&slowed), StallAction::None);
        slowed.audio.level = 20;
        assert_eq!(machine.stall_action(&slowed), StallAction::SpeedAdjust(0.0));

        // stalled but with data still queued: wait for the queue to run empty
        audio.stalled = true;
        assert_eq!(machine.stall_action(&stall(true, audio, video)), StallAction::None);
        audio.level = 0;
        assert_eq!(machine.stall_action(&stall(true, audio, video)), StallAction::FlushResync);
    }

    #[test]
    fn test_stall_detected_before_streams_inited() {
        let machine = machine(CachingState::Done);
        let mut audio = view(SyncState::InSync);
        let mut video = view(SyncState::InSync);
        audio.inited = false;
        video.inited = false;
        video.stalled = true;
        audio.level = 10;
        video.level = 0;
        assert_eq!(machine.stall_action(&stall(false, audio, video)), StallAction::CacheFull);
    }

    #[test]
    fn test_caching_times_projection() {
        // 100 MB over 1000 s: 10 us of media per byte
        let status = CacheStatus {
            forward: 10_000_000,
            current_rate: 1_000_000,
            max_rate: 2_000_000,
            level: 1.0,
        };
        let times = caching_times(&status, 100_000_000, 0, 1_000_000, 0).unwrap();
        assert!((times.offset - 0.1).abs() < 1e-9);
        // a 1 MB/s link outruns a 100 kB/s stream
        assert!(times.level >= 1.0);
        assert!(times.delay < 0.0);

        let slow = CacheStatus { current_rate: 50_000, ..status };
        let times = caching_times(&slow, 100_000_000, 0, 1_000_000, 0).unwrap();
        assert!(times.level < 1.0);
        assert!(times.delay > 0.0);

        let unknown_rate = CacheStatus { current_rate: 0, ..status };
        assert_eq!(caching_times(&unknown_rate, 100_000_000, 0, 1_000_000, 0).unwrap().level, 0.0);

        let starving = CacheStatus { level: -1.0, ..status };
        assert_eq!(caching_times(&starving, 100_000_000, 0, 1_000_000, 0).unwrap().level, -1.0);

        assert!(caching_times(&status, -1, 0, 1_000_000, 0).is_none());
        assert!(caching_times(&status, 100, 0, 0, 0).is_none());
    }

    #[test]
    fn test_queue_time_from_levels() {
        assert_eq!(queue_time_ms(50, 25, 8000), 4000);
        assert_eq!(queue_time_ms(0, 0, 8000), 0);
        assert_eq!(queue_time_ms(150, 0, 8000), 8000);
    }
}
