//! Master clock shared by the control thread and every pipeline
//!
//! The clock value advances with absolute time scaled by the play speed and
//! the speed adjust, and stands still while paused. Discontinuities rebase it
//! to an arbitrary value.

use avlock_common::time::TimeSource;
use avlock_common::timing::{Timestamp, PLAYSPEED_NORMAL};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug)]
struct ClockState {
    /// Absolute time of the last rebase
    base_abs: Timestamp,
    /// Clock value at the last rebase
    base_clock: Timestamp,
    speed: i32,
    paused: bool,
    speed_adjust: f64,
}

/// Shared playback clock
pub struct MasterClock {
    source: Arc<dyn TimeSource>,
    state: Mutex<ClockState>,
}

impl MasterClock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let now = source.now_us();
        Self {
            source,
            state: Mutex::new(ClockState {
                base_abs: now,
                base_clock: 0,
                speed: PLAYSPEED_NORMAL,
                paused: false,
                speed_adjust: 0.0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn value_at(state: &ClockState, now: Timestamp) -> Timestamp {
        if state.paused {
            return state.base_clock;
        }
        let elapsed = (now - state.base_abs) as f64;
        let rate = state.speed as f64 / PLAYSPEED_NORMAL as f64 * (1.0 + state.speed_adjust);
        state.base_clock + (elapsed * rate).round() as Timestamp
    }

    fn rebase(&self, state: &mut ClockState) {
        let now = self.source.now_us();
        state.base_clock = Self::value_at(state, now);
        state.base_abs = now;
    }

    /// Current clock value
    pub fn get_clock(&self) -> Timestamp {
        let state = self.lock();
        Self::value_at(&state, self.source.now_us())
    }

    /// Absolute (unscaled) time of the underlying source
    pub fn absolute(&self) -> Timestamp {
        self.source.now_us()
    }

    /// Jump the clock to `clock`
    pub fn discontinuity(&self, clock: Timestamp) {
        let mut state = self.lock();
        state.base_clock = clock;
        state.base_abs = self.source.now_us();
        debug!("Clock discontinuity to {}us", clock);
    }

    /// Shift the clock by `delta` without touching speed
    pub fn advance(&self, delta: Timestamp) {
        let mut state = self.lock();
        self.rebase(&mut state);
        state.base_clock += delta;
    }

    pub fn set_speed(&self, speed: i32) {
        let mut state = self.lock();
        self.rebase(&mut state);
        state.speed = speed;
    }

    pub fn speed(&self) -> i32 {
        self.lock().speed
    }

    pub fn pause(&self, paused: bool) {
        let mut state = self.lock();
        self.rebase(&mut state);
        state.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Fractional speed correction (e.g. -0.01 runs 1% slow)
    pub fn set_speed_adjust(&self, adjust: f64) {
        let mut state = self.lock();
        if (state.speed_adjust - adjust).abs() > f64::EPSILON {
            self.rebase(&mut state);
            debug!("Clock speed adjust {:.3}", adjust);
            state.speed_adjust = adjust;
        }
    }

    pub fn speed_adjust(&self) -> f64 {
        self.lock().speed_adjust
    }
}
