//! Selection stream registry
//!
//! Catalog of every elementary stream known across all active sources (main
//! demuxer, disc navigator, external subtitle files, embedded captions).
//!
//! # Invariants
//!
//! - No two entries share (type, source, demuxer_id, id)
//! - `type_index` of an entry never changes until that entry is cleared
//! - New entries take the lowest free index of their type, so clearing one
//!   source and re-enumerating it does not shift the indices of other sources
//! - Source slots are stable per originating path for the whole session

use super::types::{SelectionStream, SourceId, SourceKind, StreamFlags};
use avlock_common::StreamType;
use std::collections::BTreeMap;
use tracing::debug;

/// Registry of selectable streams
#[derive(Debug, Default, Clone)]
pub struct SelectionStreams {
    streams: Vec<SelectionStream>,
    slots: BTreeMap<(SourceKind, String), u16>,
}

impl SelectionStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update `stream`, returning its type index
    ///
    /// An existing entry keeps its type index; its disabled flag is sticky.
    pub fn update(&mut self, mut stream: SelectionStream) -> i32 {
        let key = stream.key();
        if let Some(existing) = self.streams.iter_mut().find(|s| s.key() == key) {
            stream.type_index = existing.type_index;
            stream.disabled |= existing.disabled;
            *existing = stream;
            return existing.type_index;
        }

        stream.type_index = self.lowest_free_index(stream.stream_type);
        debug!(
            "Registered {} stream id={} demuxer_id={} source={} as index {}",
            stream.stream_type, stream.id, stream.demuxer_id, stream.source, stream.type_index
        );
        let index = stream.type_index;
        self.streams.push(stream);
        index
    }

    fn lowest_free_index(&self, stream_type: StreamType) -> i32 {
        let mut used: Vec<i32> = self
            .streams
            .iter()
            .filter(|s| s.stream_type == stream_type)
            .map(|s| s.type_index)
            .collect();
        used.sort_unstable();
        let mut candidate = 0;
        for index in used {
            if index == candidate {
                candidate += 1;
            } else if index > candidate {
                break;
            }
        }
        candidate
    }

    /// Remove entries matching both filters (`None` matches anything)
    pub fn clear(&mut self, stream_type: Option<StreamType>, source: Option<SourceKind>) {
        self.streams.retain(|s| {
            let type_match = stream_type.map_or(true, |t| s.stream_type == t);
            let source_match = source.map_or(true, |k| s.source.kind == k);
            !(type_match && source_match)
        });
    }

    /// Drop every entry and every source slot
    pub fn reset(&mut self) {
        self.streams.clear();
        self.slots.clear();
    }

    /// Entry at `index` for `stream_type`, or the invalid sentinel
    pub fn get(&self, stream_type: StreamType, index: i32) -> SelectionStream {
        self.find(stream_type, index)
            .cloned()
            .unwrap_or_else(|| SelectionStream::invalid(stream_type))
    }

    /// Entry at `index` for `stream_type`, if any
    pub fn find(&self, stream_type: StreamType, index: i32) -> Option<&SelectionStream> {
        self.streams
            .iter()
            .find(|s| s.stream_type == stream_type && s.type_index == index)
    }

    /// Entry with the given identity, if any
    pub fn find_key(
        &self,
        stream_type: StreamType,
        source: SourceId,
        demuxer_id: i32,
        id: i32,
    ) -> Option<&SelectionStream> {
        let key = (stream_type, source, demuxer_id, id);
        self.streams.iter().find(|s| s.key() == key)
    }

    /// All entries of `stream_type` in type index order
    pub fn get_all(&self, stream_type: StreamType) -> Vec<&SelectionStream> {
        let mut all: Vec<&SelectionStream> = self
            .streams
            .iter()
            .filter(|s| s.stream_type == stream_type)
            .collect();
        all.sort_by_key(|s| s.type_index);
        all
    }

    /// First entry of `stream_type` carrying `flag`
    pub fn find_flagged(&self, stream_type: StreamType, flag: StreamFlags) -> Option<&SelectionStream> {
        self.get_all(stream_type)
            .into_iter()
            .find(|s| s.flags.contains(flag))
    }

    pub fn count_type(&self, stream_type: StreamType) -> usize {
        self.streams.iter().filter(|s| s.stream_type == stream_type).count()
    }

    pub fn count_type_of_source(&self, stream_type: StreamType, source: SourceKind) -> usize {
        self.streams
            .iter()
            .filter(|s| s.stream_type == stream_type && s.source.kind == source)
            .count()
    }

    /// Type index of the identified stream, or -1 when absent
    pub fn type_index_of(
        &self,
        stream_type: StreamType,
        source: SourceId,
        demuxer_id: i32,
        id: i32,
    ) -> i32 {
        self.find_key(stream_type, source, demuxer_id, id)
            .map_or(-1, |s| s.type_index)
    }

    /// Stable source slot for `kind` and originating `path`, created on first use
    pub fn source(&mut self, kind: SourceKind, path: &str) -> SourceId {
        if let Some(slot) = self.slots.get(&(kind, path.to_string())) {
            return SourceId::new(kind, *slot);
        }
        let slot = self.slots.keys().filter(|(k, _)| *k == kind).count() as u16;
        self.slots.insert((kind, path.to_string()), slot);
        SourceId::new(kind, slot)
    }

    /// Mark the identified stream as failed; returns false when it is unknown
    pub fn set_disabled(
        &mut self,
        stream_type: StreamType,
        source: SourceId,
        demuxer_id: i32,
        id: i32,
    ) -> bool {
        let key = (stream_type, source, demuxer_id, id);
        match self.streams.iter_mut().find(|s| s.key() == key) {
            Some(stream) => {
                stream.disabled = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Copy for publication to readers
    pub fn snapshot(&self) -> Vec<SelectionStream> {
        let mut copy = self.streams.clone();
        copy.sort_by_key(|s| (s.stream_type, s.type_index));
        copy
    }
}
