//! Wall-clock and monotonic time sources
//!
//! The engine never reads `Instant::now()` directly. Every timer (state
//! publication interval, resync cooldown, init timeout) goes through a
//! [`TimeSource`] so simulations and tests can drive time by hand.

use crate::timing::Timestamp;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Monotonic microsecond time source
pub trait TimeSource: Send + Sync {
    /// Microseconds since an arbitrary fixed origin; never decreases
    fn now_us(&self) -> Timestamp;
}

/// Time source backed by `std::time::Instant`
#[derive(Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_us(&self) -> Timestamp {
        self.origin.elapsed().as_micros() as Timestamp
    }
}

/// Hand-driven time source for simulations and tests
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicI64,
}

impl ManualTimeSource {
    pub fn new(start_us: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start_us),
        }
    }

    /// Move time forward by `delta_us` (negative deltas are ignored)
    pub fn advance(&self, delta_us: Timestamp) {
        if delta_us > 0 {
            self.now.fetch_add(delta_us, Ordering::SeqCst);
        }
    }

    /// Move time forward by whole milliseconds
    pub fn advance_ms(&self, ms: i64) {
        self.advance(ms * 1000);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_us(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
