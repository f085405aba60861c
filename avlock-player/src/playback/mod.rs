//! Playback control plane: cursors, sync machinery and the engine driving them

pub mod caching;
pub mod clock;
pub mod clock_sync;
pub mod continuity;
pub mod cursor;
pub mod edl;
pub mod engine;
pub mod gate;
pub mod messages;
pub mod scene_skip;
pub mod seek;
pub mod snapshot;
pub mod trick_play;

pub use clock::MasterClock;
pub use edl::{EditAction, EditDecision, EditDecisionList};
pub use engine::{PlayerEngine, SessionParts, StepOutcome};
pub use messages::{control_channel, ControlMessage, ControlReceiver, ControlSender, OpenOptions};
pub use seek::SeekRequest;
pub use snapshot::{ChapterInfo, PlayStateSnapshot};
