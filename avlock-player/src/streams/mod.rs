//! Elementary stream catalog and default selection policy

pub mod language;
pub mod registry;
pub mod selection;
pub mod types;

pub use registry::SelectionStreams;
pub use selection::{PredicateChain, SelectionContext, SelectionPolicy, SubtitleFilter};
pub use types::{SelectionStream, SourceId, SourceKind, StreamFlags};
