//! Seek requests

use serde::{Deserialize, Serialize};

/// One seek as queued on the control channel
///
/// The defaults describe a user seek: flush the pipelines, land exactly on
/// the target, map it through the EDL and resync the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekRequest {
    /// Target in milliseconds, absolute or relative to the current time
    pub time_ms: i64,
    pub relative: bool,
    /// Prefer the keyframe before the target
    pub backward: bool,
    pub flush: bool,
    /// Drop everything before the target instead of starting at the keyframe
    pub accurate: bool,
    /// Target is on the cut timeline and must be mapped back to media time
    pub restore: bool,
    /// Resync the clock after the seek
    pub sync: bool,
    pub trick_play: bool,
}

impl SeekRequest {
    pub fn to(time_ms: i64) -> Self {
        Self {
            time_ms,
            relative: false,
            backward: false,
            flush: true,
            accurate: true,
            restore: true,
            sync: true,
            trick_play: false,
        }
    }

    pub fn by(offset_ms: i64) -> Self {
        Self {
            relative: true,
            backward: offset_ms < 0,
            ..Self::to(offset_ms)
        }
    }

    pub fn backward(mut self, backward: bool) -> Self {
        self.backward = backward;
        self
    }

    pub fn inexact(mut self) -> Self {
        self.accurate = false;
        self
    }

    pub fn without_restore(mut self) -> Self {
        self.restore = false;
        self
    }

    /// Trick-play catch-up: inexact, no clock resync
    pub fn trick_play(mut self) -> Self {
        self.trick_play = true;
        self.accurate = false;
        self.sync = false;
        self.restore = false;
        self
    }

    /// Absolute target given the current time
    pub fn target_ms(&self, current_ms: i64) -> i64 {
        let target = if self.relative {
            current_ms + self.time_ms
        } else {
            self.time_ms
        };
        target.max(0)
    }
}
