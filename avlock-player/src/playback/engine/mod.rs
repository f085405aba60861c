//! Control-thread playback engine
//!
//! **Module Structure:**
//! - `core.rs`: PlayerEngine struct, construction, step loop, open and exit
//! - `router.rs`: Packet reads, routing to cursors, better-stream adoption
//! - `streams.rs`: Registry enumeration, default selection, stream open/close
//! - `messages.rs`: Inbound control messages, seeks and buffer flushes
//! - `speed.rs`: Caching transitions, clock handshake, stall and trick-play checks
//! - `state.rs`: Play-state snapshot assembly and publication
//!
//! Every file adds an `impl PlayerEngine` block over the fields declared in
//! `core.rs`; nothing outside the control thread touches them.

mod core;
mod messages;
mod router;
mod speed;
mod state;
mod streams;

pub use core::{PlayerEngine, SessionParts, StepOutcome};
