//! # avlock Common Library
//!
//! Shared code for the avlock crates including:
//! - Event types (PlayerEvent enum) and session outcomes
//! - Elementary stream and caching state enums
//! - Microsecond timestamp conversions
//! - Configuration file resolution
//! - Utility functions

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod time;
pub mod timing;

pub use error::{Error, Result};
pub use events::{CachingState, PlayerEvent, SessionOutcome};
pub use media::StreamType;
pub use timing::Timestamp;
