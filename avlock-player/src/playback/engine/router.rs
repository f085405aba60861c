//! Packet reading and routing
//!
//! Packets come from the external subtitle demuxer of the active subtitle
//! (when its pipeline wants data) or from the main demuxer. Each one is
//! offset-corrected, offered to the better-stream check, then routed to the
//! cursor that owns it. Orphan packets are discarded.

use super::core::PlayerEngine;
use crate::collaborators::{DemuxPacket, DemuxRead, PipelineMessage, StreamHint, StreamInfo};
use crate::playback::continuity::Continuity;
use crate::playback::gate::{check_player_init, scene_disposition, GateVerdict};
use crate::streams::{SourceId, SourceKind};
use avlock_common::timing::msec_to_time;
use avlock_common::StreamType;
use tracing::{debug, error, info};

/// Outcome of one read
pub(super) enum ReadResult {
    Packet(DemuxPacket, SourceId),
    /// Nothing to route (stream change handled or packet discarded)
    Handled,
    EndOfStream,
}

impl PlayerEngine {
    pub(super) fn read_packet(&mut self) -> ReadResult {
        if let Some(result) = self.read_subtitle_packet() {
            return result;
        }

        let Some(demuxer) = self.demuxer.as_mut() else {
            return ReadResult::EndOfStream;
        };
        match demuxer.read() {
            DemuxRead::EndOfStream => ReadResult::EndOfStream,
            DemuxRead::StreamChange => {
                info!("Demuxer reported a stream change");
                self.refresh_demux_streams();
                self.open_default_streams(false);
                if !self.cursors.video().is_active() {
                    self.has_video = false;
                }
                if !self.cursors.audio().is_active() {
                    self.has_audio = false;
                }
                ReadResult::Handled
            }
            DemuxRead::Packet(mut packet) => {
                self.continuity.apply_offset(&mut packet);
                if packet.stream_id < 0 {
                    return ReadResult::Handled;
                }
                let Some(info) = demuxer.stream(packet.demuxer_id, packet.stream_id) else {
                    error!(
                        "Packet for unknown stream {}/{}, discarding",
                        packet.demuxer_id, packet.stream_id
                    );
                    return ReadResult::Handled;
                };
                // streams announced mid-file
                if let Some(stream_type) = info.stream_type {
                    let known = self
                        .registry
                        .find_key(stream_type, self.demux_source, info.demuxer_id, info.id)
                        .is_some();
                    if !known && self.navigator.is_none() {
                        self.refresh_demux_streams();
                    }
                }
                ReadResult::Packet(packet, self.demux_source)
            }
        }
    }

    fn read_subtitle_packet(&mut self) -> Option<ReadResult> {
        let source = self.cursors.get(StreamType::Subtitle).source?;
        if source.kind != SourceKind::ExternalSub || !self.pipelines.accepts_data(StreamType::Subtitle) {
            return None;
        }
        let demuxer = self.subtitle_demuxers.get_mut(&source)?;
        match demuxer.read() {
            DemuxRead::Packet(mut packet) => {
                self.continuity.apply_offset(&mut packet);
                Some(ReadResult::Packet(packet, source))
            }
            DemuxRead::StreamChange => {
                self.refresh_subtitle_streams();
                self.open_default_streams(false);
                Some(ReadResult::Handled)
            }
            DemuxRead::EndOfStream => None,
        }
    }

    /// Description of a stream as its owning demuxer reports it
    pub(super) fn stream_info(&self, source: SourceId, demuxer_id: i32, id: i32) -> Option<StreamInfo> {
        match source.kind {
            SourceKind::Demux => self.demuxer.as_ref()?.stream(demuxer_id, id),
            SourceKind::ExternalSub => self.subtitle_demuxers.get(&source)?.stream(demuxer_id, id),
            SourceKind::EmbeddedCc => self
                .caption_demuxer
                .as_ref()?
                .streams()
                .into_iter()
                .find(|s| s.id == id),
            SourceKind::DiscNav | SourceKind::ExternalText => None,
        }
    }

    pub(super) fn process_packet(&mut self, packet: DemuxPacket, source: SourceId) {
        let info = self.stream_info(source, packet.demuxer_id, packet.stream_id);
        if let Some(info) = info.as_ref().filter(|_| source.kind == SourceKind::Demux) {
            self.check_better_streams(info, source);
        }

        match self.cursors.owner_of(&packet, source) {
            Some(stream_type) if stream_type.is_av() => {
                self.process_av_packet(stream_type, packet, source, info.as_ref())
            }
            Some(stream_type) => self.process_side_packet(stream_type, packet, source, info.as_ref()),
            None => {
                // navigator-driven streams must keep flowing so they can be adopted
                if source.kind == SourceKind::Demux && self.navigator.is_none() {
                    if let Some(demuxer) = self.demuxer.as_mut() {
                        demuxer.enable_stream(packet.demuxer_id, packet.stream_id, false);
                    }
                }
            }
        }
    }

    fn check_better_streams(&mut self, info: &StreamInfo, source: SourceId) {
        for stream_type in StreamType::ALL {
            if !self.is_valid_stream(stream_type) && self.pipelines.is_stalled(stream_type) {
                info!("Active {} stream is no longer valid, closing", stream_type);
                self.close_stream(stream_type, true);
            }
            if self.is_better_stream(stream_type, info) {
                debug!("Adopting {} stream {}", stream_type, info.id);
                self.open_stream(stream_type, info.demuxer_id, info.id, source, true);
            }
        }
    }

    fn is_better_stream(&self, stream_type: StreamType, info: &StreamInfo) -> bool {
        if !self.pipelines.contains(stream_type) || info.stream_type != Some(stream_type) || info.disabled {
            return false;
        }
        if self.config.selection.video_only && stream_type != StreamType::Video {
            return false;
        }
        let disabled = self
            .registry
            .find_key(stream_type, self.demux_source, info.demuxer_id, info.id)
            .is_some_and(|s| s.disabled);
        if disabled {
            return false;
        }

        let cursor = self.cursors.get(stream_type);
        if let Some(physical) = self.navigator_physical_id(stream_type) {
            let current = cursor.id == info.id && cursor.demuxer_id == info.demuxer_id;
            return physical >= 0 && info.id == physical && !current;
        }
        if stream_type == StreamType::Subtitle {
            return false;
        }
        !cursor.is_active()
    }

    /// Demuxer stream id the navigator currently routes for `stream_type`
    fn navigator_physical_id(&self, stream_type: StreamType) -> Option<i32> {
        let nav = self.navigator.as_ref()?;
        match stream_type {
            StreamType::Audio => Some(nav.physical_audio_id()),
            StreamType::Subtitle => Some(nav.physical_subtitle_id()),
            _ => None,
        }
    }

    /// False when the active stream's backing stream vanished, was disabled,
    /// or is no longer the one the navigator selects
    pub(super) fn is_valid_stream(&self, stream_type: StreamType) -> bool {
        let cursor = self.cursors.get(stream_type);
        let Some(source) = cursor.source.filter(|_| cursor.is_active()) else {
            return true;
        };
        if matches!(source.kind, SourceKind::ExternalText | SourceKind::DiscNav) {
            return true;
        }
        let Some(info) = self.stream_info(source, cursor.demuxer_id, cursor.id) else {
            return false;
        };
        if info.disabled || info.stream_type != Some(stream_type) {
            return false;
        }
        if source.kind == SourceKind::Demux {
            if let Some(physical) = self.navigator_physical_id(stream_type) {
                return info.id == physical;
            }
        }
        true
    }

    /// Reopen the pipeline when the demuxer changed the stream's parameters
    fn check_stream_changes(&mut self, stream_type: StreamType, info: &StreamInfo, source: SourceId) {
        let cursor = self.cursors.get(stream_type);
        if cursor.changes == info.changes {
            return;
        }
        let hint = StreamHint::from_info(info, source);
        let reopen = cursor.hint.as_ref().map_or(true, |current| current.needs_reopen(&hint));
        if !reopen {
            let cursor = self.cursors.get_mut(stream_type);
            cursor.changes = info.changes;
            cursor.hint = Some(hint);
            return;
        }

        info!("{} stream {} parameters changed, reopening", stream_type, info.id);
        if source.kind == SourceKind::Demux {
            self.refresh_demux_streams();
        }
        if !self.open_stream(stream_type, info.demuxer_id, info.id, source, false) {
            self.close_stream(stream_type, false);
            self.open_default_streams(false);
        }
    }

    fn process_av_packet(
        &mut self,
        stream_type: StreamType,
        mut packet: DemuxPacket,
        source: SourceId,
        info: Option<&StreamInfo>,
    ) {
        if let Some(info) = info {
            self.check_stream_changes(stream_type, info, source);
            if !self.cursors.get(stream_type).owns(&packet, source) {
                return;
            }
        }

        let play_speed = self.play_speed;
        let interval = msec_to_time(self.config.sync.play_state_interval_ms);
        let Some((cursor, other)) = self.cursors.av_pair_mut(stream_type) else {
            return;
        };
        if let Continuity::Corrected(correction) = self.continuity.check(cursor, other, &mut packet, play_speed) {
            info!(
                "{} timeline corrected by {}us, offset now {}us",
                stream_type,
                correction,
                self.continuity.offset()
            );
        }
        let moved = cursor.update_timestamps(&packet, interval);
        let inited = cursor.inited;
        self.state_dts = cursor.dts;
        if moved && inited {
            self.update_play_state(true);
        }

        let gate = check_player_init(&mut self.cursors, stream_type, &packet, self.config.sync.gate_abandon());
        let scene = scene_disposition(self.cursors.get(stream_type), &self.edl, self.continuity.offset());
        let drop = gate == GateVerdict::Drop || scene.drop;

        let captions = if stream_type == StreamType::Video {
            self.extract_captions(&packet)
        } else {
            Vec::new()
        };
        self.pipelines.send(
            stream_type,
            PipelineMessage::Packet {
                packet,
                drop,
                mute: scene.mute,
            },
            0,
        );

        let caption_source = self.caption_source;
        for caption in captions {
            if self.cursors.get(StreamType::Subtitle).owns(&caption, caption_source) {
                self.process_side_packet(StreamType::Subtitle, caption, caption_source, None);
            }
        }
    }

    fn process_side_packet(
        &mut self,
        stream_type: StreamType,
        packet: DemuxPacket,
        source: SourceId,
        info: Option<&StreamInfo>,
    ) {
        if let Some(info) = info {
            self.check_stream_changes(stream_type, info, source);
            if !self.cursors.get(stream_type).owns(&packet, source) {
                return;
            }
        }

        let interval = msec_to_time(self.config.sync.play_state_interval_ms);
        self.cursors.get_mut(stream_type).update_timestamps(&packet, interval);
        let gate = check_player_init(&mut self.cursors, stream_type, &packet, self.config.sync.gate_abandon());
        let scene = scene_disposition(self.cursors.get(stream_type), &self.edl, self.continuity.offset());
        let drop = gate == GateVerdict::Drop || scene.drop;
        self.pipelines.send(stream_type, PipelineMessage::packet(packet, drop), 0);
    }

    /// Feed a video packet to the caption extractor
    fn extract_captions(&mut self, video_packet: &DemuxPacket) -> Vec<DemuxPacket> {
        let Some(captions) = self.caption_demuxer.as_mut() else {
            return Vec::new();
        };
        let packets = captions.feed(video_packet);
        if captions.take_new_streams() {
            debug!("Caption demuxer found new streams");
            self.refresh_caption_streams();
            self.open_default_streams(false);
        }
        packets
    }
}
