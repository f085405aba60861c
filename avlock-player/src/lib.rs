//! # avlock Player Library (avlock-player)
//!
//! Playback synchronization engine for audio/video players.
//!
//! **Purpose:** Pull packets from a demuxer, route them to per-type decode
//! pipelines, keep audio and video locked to one master clock, and drive
//! buffering, seeking, trick play and EDL skipping.
//!
//! **Architecture:** One control thread owns a [`PlayerEngine`]; everything
//! else talks to it through [`ControlMessage`]s via a [`PlayerHandle`] and
//! reads the published [`PlayStateSnapshot`]. Inputs, demuxers and pipelines
//! are collaborator traits; [`sim`] provides scripted implementations.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod handle;
pub mod playback;
pub mod sim;
pub mod state;
pub mod streams;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use handle::PlayerHandle;
pub use playback::{ControlMessage, OpenOptions, PlayStateSnapshot, PlayerEngine, SeekRequest, SessionParts};
pub use state::SharedState;
