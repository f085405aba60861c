//! Microsecond timestamp model shared by the engine and its collaborators
//!
//! Every presentation and decode timestamp handled by avlock is a signed
//! 64-bit count of microseconds. An unknown timestamp is represented as
//! `Option<Timestamp>::None`; there is no in-band sentinel value.
//!
//! # Representations
//!
//! 1. **Timestamp (internal)**: `i64` microseconds, time base 1 000 000
//! 2. **Milliseconds (API)**: `i64` values used for seek targets, EDL entries
//!    and the published play-state snapshot
//! 3. **Seconds (config)**: `f64` values accepted from configuration and
//!    scenario files
//!
//! # Playback speed
//!
//! Playback speed is an integer in thousandths of normal speed:
//!
//! - `PLAYSPEED_NORMAL` (1000) plays at 1x
//! - `PLAYSPEED_PAUSE` (0) is paused
//! - values above 1000 fast forward, negative values rewind
//!
//! # Precision
//!
//! - `i64::MAX` microseconds is roughly 292 000 years
//! - millisecond conversions truncate toward zero
//!
//! # Examples
//!
//! ```
//! use avlock_common::timing::{msec_to_time, time_to_msec, TIME_BASE};
//!
//! let ts = msec_to_time(1500);
//! assert_eq!(ts, 1_500_000);
//! assert_eq!(time_to_msec(ts), 1500);
//! assert_eq!(TIME_BASE, 1_000_000);
//! ```

/// Signed microsecond timestamp
pub type Timestamp = i64;

/// Number of timestamp units per second
pub const TIME_BASE: i64 = 1_000_000;

/// Normal (1x) playback speed in thousandths
pub const PLAYSPEED_NORMAL: i32 = 1000;

/// Paused playback speed
pub const PLAYSPEED_PAUSE: i32 = 0;

/// Convert milliseconds to a timestamp
pub const fn msec_to_time(ms: i64) -> Timestamp {
    ms * (TIME_BASE / 1000)
}

/// Convert whole seconds to a timestamp
pub const fn sec_to_time(sec: i64) -> Timestamp {
    sec * TIME_BASE
}

/// Convert a timestamp to milliseconds (truncating)
pub const fn time_to_msec(ts: Timestamp) -> i64 {
    ts / (TIME_BASE / 1000)
}

/// Convert a timestamp to fractional seconds
pub fn time_to_sec_f64(ts: Timestamp) -> f64 {
    ts as f64 / TIME_BASE as f64
}

/// Convert fractional seconds to a timestamp (rounded to the nearest microsecond)
pub fn sec_f64_to_time(sec: f64) -> Timestamp {
    (sec * TIME_BASE as f64).round() as Timestamp
}

/// Speed as a multiple of normal playback (1.0 = normal, -2.0 = 2x rewind)
pub fn speed_ratio(speed: i32) -> f64 {
    speed as f64 / PLAYSPEED_NORMAL as f64
}

/// True when `speed` is a trick-play speed (neither normal nor paused)
pub fn is_trick_play(speed: i32) -> bool {
    speed != PLAYSPEED_NORMAL && speed != PLAYSPEED_PAUSE
}

/// Duration of a single frame at `rate / scale` frames per second
///
/// Returns `None` when the rate is unknown.
pub fn frame_duration(rate: u32, scale: u32) -> Option<Timestamp> {
    if rate == 0 || scale == 0 {
        return None;
    }
    Some(TIME_BASE * scale as i64 / rate as i64)
}
