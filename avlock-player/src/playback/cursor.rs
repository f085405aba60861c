//! Per-type playback cursors
//!
//! One [`CurrentStream`] exists for every stream type. It records which
//! stream is active, where its timestamps are, and how far the stream has
//! progressed through the start gate and the clock handshake.

use crate::collaborators::{DemuxPacket, StreamHint};
use crate::streams::SourceId;
use avlock_common::{StreamType, Timestamp};
use serde::Serialize;

/// Clock handshake progress of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Pipeline opened or flushed, no output yet
    Starting,
    /// Pipeline reported its first output, waiting for the shared resync
    WaitSync,
    /// Locked to the clock
    InSync,
}

/// Continuity confirmation used to resolve the handshake early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvSyncState {
    None,
    /// Waiting for the continuity check to confirm the timeline
    Check,
    /// Timeline confirmed; may resync without its counterpart
    Cont,
    /// A full joint resync is required
    Force,
}

/// Cursor of the active stream of one type
#[derive(Debug, Clone)]
pub struct CurrentStream {
    pub stream_type: StreamType,
    /// Demuxer stream id, -1 when no stream is active
    pub id: i32,
    pub demuxer_id: i32,
    pub source: Option<SourceId>,
    pub hint: Option<StreamHint>,
    /// Demuxer change counter seen when the stream was opened
    pub changes: u32,

    pub dts: Option<Timestamp>,
    /// Running packet duration estimate
    pub dur: Timestamp,
    /// Last dts used for jump corroboration
    pub last_dts: Option<Timestamp>,
    /// dts at the last play-state publication
    pub dts_state: Option<Timestamp>,

    /// Start gate; packets before it are dropped
    pub startpts: Option<Timestamp>,
    pub inited: bool,
    pub sync_state: SyncState,
    pub avsync: AvSyncState,

    /// Values from the pipeline's start notification
    pub start_time: Option<Timestamp>,
    pub cache_time: Timestamp,
    pub cache_total: Timestamp,

    /// Packets routed since the stream was opened or flushed
    pub packets: u64,
    /// Gate drop already logged for the current gate
    pub gate_drop_logged: bool,

    default_dur: Timestamp,
}

impl CurrentStream {
    pub fn new(stream_type: StreamType, default_dur: Timestamp) -> Self {
        Self {
            stream_type,
            id: -1,
            demuxer_id: -1,
            source: None,
            hint: None,
            changes: 0,
            dts: None,
            dur: default_dur,
            last_dts: None,
            dts_state: None,
            startpts: None,
            inited: false,
            sync_state: SyncState::Starting,
            avsync: AvSyncState::None,
            start_time: None,
            cache_time: 0,
            cache_total: 0,
            packets: 0,
            gate_drop_logged: false,
            default_dur,
        }
    }

    /// Forget the active stream and every timestamp
    pub fn clear(&mut self) {
        *self = Self::new(self.stream_type, self.default_dur);
    }

    pub fn is_active(&self) -> bool {
        self.id >= 0
    }

    /// Expected dts of the packet following the last one
    pub fn dts_end(&self) -> Option<Timestamp> {
        self.dts.map(|dts| dts + self.dur)
    }

    /// True when `packet` belongs to this cursor's stream
    pub fn owns(&self, packet: &DemuxPacket, source: SourceId) -> bool {
        self.is_active()
            && self.id == packet.stream_id
            && self.demuxer_id == packet.demuxer_id
            && self.source == Some(source)
    }

    /// Record the packet's timestamps and refine the duration estimate
    ///
    /// Returns true when the dts moved more than `publish_interval` since the
    /// last play-state publication.
    pub fn update_timestamps(&mut self, packet: &DemuxPacket, publish_interval: Timestamp) -> bool {
        let packet_dts = packet.dts.or(packet.pts);

        if let Some(duration) = packet.duration {
            self.dur = duration;
        } else if let (Some(new), Some(old)) = (packet_dts, self.dts) {
            // exponential average, 90% history
            self.dur = (self.dur * 9 + (new - old)) / 10;
        }

        self.dts = packet_dts.or(self.dts);
        self.packets += 1;

        match (self.dts, self.dts_state) {
            (Some(dts), Some(state)) if (dts - state).abs() <= publish_interval => false,
            (Some(dts), _) => {
                self.dts_state = Some(dts);
                true
            }
            (None, _) => false,
        }
    }

    /// Reset per-seek progress, keeping the active stream
    ///
    /// `sync` also restarts the clock handshake for this cursor.
    pub fn reset_for_flush(&mut self, startpts: Option<Timestamp>, sync: bool) {
        self.dts = None;
        self.last_dts = None;
        self.dts_state = None;
        self.startpts = startpts;
        self.packets = 0;
        self.gate_drop_logged = false;
        if sync {
            self.sync_state = SyncState::Starting;
            self.start_time = None;
            self.inited = false;
            if self.stream_type.is_av() {
                self.avsync = AvSyncState::Force;
            }
        }
    }
}

/// The six per-type cursors
#[derive(Debug, Clone)]
pub struct Cursors {
    cursors: [CurrentStream; 6],
}

impl Cursors {
    pub fn new(default_dur: Timestamp) -> Self {
        Self {
            cursors: StreamType::ALL.map(|t| CurrentStream::new(t, default_dur)),
        }
    }

    pub fn get(&self, stream_type: StreamType) -> &CurrentStream {
        &self.cursors[stream_type.index()]
    }

    pub fn get_mut(&mut self, stream_type: StreamType) -> &mut CurrentStream {
        &mut self.cursors[stream_type.index()]
    }

    pub fn audio(&self) -> &CurrentStream {
        self.get(StreamType::Audio)
    }

    pub fn video(&self) -> &CurrentStream {
        self.get(StreamType::Video)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CurrentStream> {
        self.cursors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CurrentStream> {
        self.cursors.iter_mut()
    }

    /// Audio or video cursor together with its counterpart
    ///
    /// Returns `None` for the other stream types.
    pub fn av_pair_mut(&mut self, stream_type: StreamType) -> Option<(&mut CurrentStream, &CurrentStream)> {
        let (head, rest) = self.cursors.split_at_mut(1);
        let video = &mut head[0];
        let audio = &mut rest[0];
        match stream_type {
            StreamType::Audio => Some((audio, &*video)),
            StreamType::Video => Some((video, &*audio)),
            _ => None,
        }
    }

    /// Cursor that owns `packet`, if any
    pub fn owner_of(&self, packet: &DemuxPacket, source: SourceId) -> Option<StreamType> {
        self.cursors
            .iter()
            .find(|c| c.owns(packet, source))
            .map(|c| c.stream_type)
    }
}
