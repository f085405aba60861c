//! Trick-play drift monitor
//!
//! At trick-play speeds the demuxer cannot deliver every frame, so the frame
//! on screen drifts away from the clock. When the drift grows too large the
//! monitor asks for an inexact seek ahead of the clock in the play direction.

use crate::config::SyncTuning;
use avlock_common::timing::{msec_to_time, time_to_msec, Timestamp, PLAYSPEED_NORMAL};
use tracing::debug;

/// What the monitor needs to know about the current frame
#[derive(Debug, Clone, Copy)]
pub struct TrickPlayObservation {
    pub speed: i32,
    pub clock: Timestamp,
    /// Presentation timestamp of the frame on screen
    pub displayed_pts: Option<Timestamp>,
    /// Published playback time in milliseconds
    pub time_ms: i64,
    /// Offset between clock and displayed media time
    pub time_offset: Timestamp,
    /// Video is active, in sync and (when playing forward) inited
    pub video_ready: bool,
}

/// Corrective seek requested by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUpSeek {
    pub time_ms: i64,
    pub backward: bool,
}

#[derive(Debug, Clone)]
pub struct TrickPlayMonitor {
    last_pts: Option<Timestamp>,
    last_time_ms: Option<i64>,
    last_seek_clock: Timestamp,
    error_threshold: Timestamp,
    speed_cap: i32,
}

impl TrickPlayMonitor {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self {
            last_pts: None,
            last_time_ms: None,
            last_seek_clock: 0,
            error_threshold: msec_to_time(tuning.trick_play_error_ms),
            speed_cap: tuning.trick_play_speed_cap,
        }
    }

    /// Forget the last observation; called on every speed change
    pub fn reset(&mut self, clock: Timestamp) {
        self.last_pts = None;
        self.last_time_ms = None;
        self.last_seek_clock = clock;
    }

    pub fn check(&mut self, obs: &TrickPlayObservation) -> Option<CatchUpSeek> {
        if obs.speed == PLAYSPEED_NORMAL || obs.speed == 0 || !obs.video_ready {
            return None;
        }
        // time has not advanced since the last check
        if self.last_time_ms == Some(obs.time_ms) {
            return None;
        }
        let pts = obs.displayed_pts?;
        // frame on screen has not changed
        if self.last_pts == Some(pts) && obs.speed > 0 {
            return None;
        }

        self.last_pts = Some(pts);
        self.last_time_ms = Some(obs.time_ms);

        let mut error = (obs.clock - pts) * obs.speed.signum() as Timestamp;
        if obs.speed > PLAYSPEED_NORMAL {
            // faster forward speeds tolerate more drift
            let window = (obs.speed / PLAYSPEED_NORMAL).min(self.speed_cap).max(1);
            error /= window as Timestamp;
        }
        if error <= self.error_threshold {
            return None;
        }

        let since_last_seek = obs.clock - self.last_seek_clock;
        if since_last_seek.abs() <= self.error_threshold {
            return None;
        }

        debug!(
            "Trick-play drift {}ms at speed {}, seeking to catch up",
            time_to_msec(error),
            obs.speed
        );
        self.last_seek_clock = obs.clock;
        let direction = obs.speed.signum() as Timestamp;
        let target = obs.clock + obs.time_offset + msec_to_time(1000) * direction;
        Some(CatchUpSeek {
            time_ms: time_to_msec(target),
            backward: obs.speed < 0,
        })
    }
}
