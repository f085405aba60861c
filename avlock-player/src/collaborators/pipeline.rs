//! Decode/render pipeline collaborator

use super::demuxer::{DemuxPacket, StreamInfo};
use crate::streams::{SourceId, StreamFlags};
use avlock_common::{StreamType, Timestamp};
use std::collections::BTreeMap;

/// Parameters a pipeline needs to open a stream
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamHint {
    pub stream_type: Option<StreamType>,
    pub id: i32,
    pub demuxer_id: i32,
    pub source: Option<SourceId>,
    pub codec: String,
    pub language: String,
    pub flags: StreamFlags,
    pub channels: u32,
    pub sample_rate: u32,
    pub width: u32,
    pub height: u32,
    pub fps_rate: u32,
    pub fps_scale: u32,
    /// File decoded directly by the pipeline (external text subtitles)
    pub filename: Option<String>,
}

impl StreamHint {
    pub fn from_info(info: &StreamInfo, source: SourceId) -> Self {
        Self {
            stream_type: info.stream_type,
            id: info.id,
            demuxer_id: info.demuxer_id,
            source: Some(source),
            codec: info.codec.clone(),
            language: info.language.clone(),
            flags: info.flags,
            channels: info.channels,
            sample_rate: info.sample_rate,
            width: info.width,
            height: info.height,
            fps_rate: info.fps_rate,
            fps_scale: info.fps_scale,
            filename: None,
        }
    }

    /// True when reopening the pipeline is required to switch to `other`
    pub fn needs_reopen(&self, other: &StreamHint) -> bool {
        self.codec != other.codec
            || self.channels != other.channels
            || self.sample_rate != other.sample_rate
            || self.width != other.width
            || self.height != other.height
            || self.filename != other.filename
    }
}

/// Messages queued to a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage {
    /// Demuxed data; `drop` asks the pipeline to decode without presenting
    Packet {
        packet: DemuxPacket,
        drop: bool,
        mute: bool,
    },
    /// Align output to the given clock value
    Resync { clock: Timestamp },
    /// Discard decoder state, keep the stream open
    Reset,
    /// No more packets will follow
    Eof,
    /// Barrier acknowledged once everything queued before it is processed
    Synchronize { timeout_ms: u64 },
    /// Subtitle pipeline visibility
    SubtitleVisible(bool),
}

impl PipelineMessage {
    pub fn packet(packet: DemuxPacket, drop: bool) -> Self {
        PipelineMessage::Packet {
            packet,
            drop,
            mute: false,
        }
    }
}

/// Decode/render pipeline for one stream type
pub trait StreamPlayer: Send {
    fn open_stream(&mut self, hint: &StreamHint) -> bool;

    fn close_stream(&mut self, wait_for_buffers: bool);

    /// Queue a message; higher priority jumps ahead of queued packets
    fn send_message(&mut self, message: PipelineMessage, priority: i32);

    fn flush(&mut self, sync: bool);

    /// Queue has room for more packets
    fn accepts_data(&self) -> bool;

    /// Queue fill in percent (0-100)
    fn level(&self) -> i32;

    /// Output has run dry while playing
    fn is_stalled(&self) -> bool;

    /// Packets are still queued or being decoded
    fn has_data(&self) -> bool;

    fn set_speed(&mut self, speed: i32);

    /// Presentation timestamp of the frame currently shown
    fn current_pts(&self) -> Option<Timestamp> {
        None
    }

    fn is_inited(&self) -> bool;
}

/// One optional pipeline per stream type
#[derive(Default)]
pub struct PipelineSet {
    players: BTreeMap<StreamType, Box<dyn StreamPlayer>>,
}

impl PipelineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stream_type: StreamType, player: Box<dyn StreamPlayer>) -> Self {
        self.insert(stream_type, player);
        self
    }

    pub fn insert(&mut self, stream_type: StreamType, player: Box<dyn StreamPlayer>) {
        self.players.insert(stream_type, player);
    }

    pub fn get(&self, stream_type: StreamType) -> Option<&dyn StreamPlayer> {
        self.players.get(&stream_type).map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, stream_type: StreamType) -> Option<&mut (dyn StreamPlayer + 'static)> {
        self.players.get_mut(&stream_type).map(|p| p.as_mut())
    }

    pub fn contains(&self, stream_type: StreamType) -> bool {
        self.players.contains_key(&stream_type)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (StreamType, &mut Box<dyn StreamPlayer>)> {
        self.players.iter_mut().map(|(t, p)| (*t, p))
    }

    /// Send `message` to the pipeline of `stream_type` if present
    pub fn send(&mut self, stream_type: StreamType, message: PipelineMessage, priority: i32) {
        if let Some(player) = self.get_mut(stream_type) {
            player.send_message(message, priority);
        }
    }

    pub fn accepts_data(&self, stream_type: StreamType) -> bool {
        self.get(stream_type).map_or(true, |p| p.accepts_data())
    }

    pub fn level(&self, stream_type: StreamType) -> i32 {
        self.get(stream_type).map_or(0, |p| p.level())
    }

    pub fn is_stalled(&self, stream_type: StreamType) -> bool {
        self.get(stream_type).map_or(true, |p| p.is_stalled())
    }

    pub fn has_data(&self, stream_type: StreamType) -> bool {
        self.get(stream_type).map_or(false, |p| p.has_data())
    }
}
