//! Elementary stream descriptors held by the selection registry

use avlock_common::StreamType;
use serde::{Deserialize, Serialize};

/// Origin of a selection stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Main container demuxer
    Demux,
    /// Disc navigator (menu-driven stream list)
    DiscNav,
    /// External text subtitle file decoded directly by the subtitle pipeline
    ExternalText,
    /// External subtitle file read through its own demuxer
    ExternalSub,
    /// Closed captions extracted from the video elementary stream
    EmbeddedCc,
}

/// Source kind plus the stable slot of its originating path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId {
    pub kind: SourceKind,
    pub slot: u16,
}

impl SourceId {
    pub fn new(kind: SourceKind, slot: u16) -> Self {
        Self { kind, slot }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.slot)
    }
}

/// Disposition flags reported by the container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamFlags(u32);

impl StreamFlags {
    pub const NONE: StreamFlags = StreamFlags(0);
    pub const DEFAULT: StreamFlags = StreamFlags(1 << 0);
    pub const FORCED: StreamFlags = StreamFlags(1 << 1);
    pub const ORIGINAL: StreamFlags = StreamFlags(1 << 2);
    pub const HEARING_IMPAIRED: StreamFlags = StreamFlags(1 << 3);
    pub const VISUAL_IMPAIRED: StreamFlags = StreamFlags(1 << 4);
    pub const STILL_IMAGES: StreamFlags = StreamFlags(1 << 5);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: StreamFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: StreamFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: StreamFlags) {
        self.0 &= !other.0;
    }

    pub fn with(mut self, other: StreamFlags) -> StreamFlags {
        self.insert(other);
        self
    }

    pub fn is_default(self) -> bool {
        self.contains(StreamFlags::DEFAULT)
    }

    pub fn is_forced(self) -> bool {
        self.contains(StreamFlags::FORCED)
    }

    pub fn is_original(self) -> bool {
        self.contains(StreamFlags::ORIGINAL)
    }

    pub fn is_hearing_impaired(self) -> bool {
        self.contains(StreamFlags::HEARING_IMPAIRED)
    }

    pub fn is_visual_impaired(self) -> bool {
        self.contains(StreamFlags::VISUAL_IMPAIRED)
    }
}

impl std::ops::BitOr for StreamFlags {
    type Output = StreamFlags;

    fn bitor(self, rhs: StreamFlags) -> StreamFlags {
        StreamFlags(self.0 | rhs.0)
    }
}

/// Catalog entry for one elementary stream of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionStream {
    pub stream_type: StreamType,
    pub source: SourceId,
    pub id: i32,
    pub demuxer_id: i32,
    /// Position among streams of the same type; -1 for the invalid sentinel
    pub type_index: i32,
    pub language: String,
    pub flags: StreamFlags,
    pub codec: String,
    pub channels: u32,
    pub bitrate: u32,
    pub width: u32,
    pub height: u32,
    /// Originating file of the source
    pub filename: String,
    /// Human readable stream title
    pub name: String,
    /// Stream failed to open and is no longer a selection candidate
    pub disabled: bool,
}

impl SelectionStream {
    pub fn new(stream_type: StreamType, source: SourceId, id: i32) -> Self {
        Self {
            stream_type,
            source,
            id,
            demuxer_id: -1,
            type_index: 0,
            language: String::new(),
            flags: StreamFlags::NONE,
            codec: String::new(),
            channels: 0,
            bitrate: 0,
            width: 0,
            height: 0,
            filename: String::new(),
            name: String::new(),
            disabled: false,
        }
    }

    /// Sentinel returned for out-of-range lookups
    pub fn invalid(stream_type: StreamType) -> Self {
        let mut stream = Self::new(stream_type, SourceId::new(SourceKind::Demux, 0), -1);
        stream.type_index = -1;
        stream
    }

    pub fn is_valid(&self) -> bool {
        self.type_index >= 0
    }

    /// Identity key: two entries with the same key describe the same stream
    pub fn key(&self) -> (StreamType, SourceId, i32, i32) {
        (self.stream_type, self.source, self.demuxer_id, self.id)
    }

    /// Subtitle streams that never need a demuxer
    pub fn is_external(&self) -> bool {
        matches!(self.source.kind, SourceKind::ExternalText | SourceKind::ExternalSub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_contains_and_remove() {
        let mut flags = StreamFlags::DEFAULT | StreamFlags::FORCED;
        assert!(flags.is_default());
        assert!(flags.is_forced());
        assert!(!flags.is_original());
        flags.remove(StreamFlags::FORCED);
        assert!(!flags.is_forced());
        assert!(!flags.contains(StreamFlags::NONE));
    }

    #[test]
    fn test_invalid_sentinel() {
        let stream = SelectionStream::invalid(StreamType::Audio);
        assert!(!stream.is_valid());
        assert_eq!(stream.id, -1);
        assert_eq!(stream.stream_type, StreamType::Audio);
    }
}
