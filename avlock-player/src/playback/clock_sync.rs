//! Clock synchronization handshake
//!
//! Audio and video pipelines report their first output independently. The
//! resolver below turns those start notifications into a single clock
//! discontinuity so both pipelines start presenting against the same clock.

use super::cursor::{AvSyncState, CurrentStream, SyncState};
use crate::config::SyncTuning;
use avlock_common::timing::{msec_to_time, Timestamp};
use avlock_common::StreamType;

/// Handshake-relevant view of an audio or video cursor and its pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandshakeSide {
    pub enabled: bool,
    pub sync_state: SyncState,
    pub avsync: AvSyncState,
    pub start_time: Option<Timestamp>,
    pub cache_time: Timestamp,
    pub cache_total: Timestamp,
    pub packets: u64,
    pub accepts_data: bool,
    pub level: i32,
}

impl HandshakeSide {
    pub fn from_cursor(cursor: &CurrentStream, accepts_data: bool, level: i32) -> Self {
        Self {
            enabled: cursor.is_active(),
            sync_state: cursor.sync_state,
            avsync: cursor.avsync,
            start_time: cursor.start_time,
            cache_time: cursor.cache_time,
            cache_total: cursor.cache_total,
            packets: cursor.packets,
            accepts_data,
            level,
        }
    }

    fn waiting(&self) -> bool {
        self.enabled && self.sync_state == SyncState::WaitSync
    }

    fn in_sync(&self) -> bool {
        self.enabled && self.sync_state == SyncState::InSync
    }

    /// Start notification usable for clock computation
    fn started_at(&self) -> Option<Timestamp> {
        self.start_time.filter(|_| self.packets > 0)
    }
}

/// Result of one handshake evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Nothing to resolve, or still waiting for the other side
    Pending,
    /// One pipeline joins the running clock on its own
    Single { stream_type: StreamType, clock: Timestamp },
    /// Both pipelines start together at `clock`
    Joint { clock: Timestamp },
}

/// Stateless handshake resolver
#[derive(Debug, Clone)]
pub struct ClockHandshake {
    packet_threshold: u64,
    realtime_packet_threshold: u64,
    starving_level: i32,
    realtime_audio_lead: Timestamp,
    cache_runway_ms: i64,
}

impl ClockHandshake {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self {
            packet_threshold: tuning.wait_sync_packet_threshold as u64,
            realtime_packet_threshold: tuning.realtime_wait_sync_packet_threshold as u64,
            starving_level: tuning.starving_level_percent,
            realtime_audio_lead: msec_to_time(tuning.realtime_audio_lead_ms),
            cache_runway_ms: tuning.cache_runway_ms,
        }
    }

    /// Packets the other side must have seen before a silent side is given up
    ///
    /// Containers with many streams interleave more sparsely, so the base
    /// threshold grows by one step per four demuxer streams.
    pub fn packet_threshold(&self, realtime: bool, stream_count: usize) -> u64 {
        let base = if realtime {
            self.realtime_packet_threshold
        } else {
            self.packet_threshold
        };
        base * (stream_count.max(1).div_ceil(4) as u64)
    }

    pub fn resolve(
        &self,
        audio: &HandshakeSide,
        video: &HandshakeSide,
        realtime: bool,
        stream_count: usize,
        current_clock: Timestamp,
    ) -> Handshake {
        if !audio.waiting() && !video.waiting() {
            return Handshake::Pending;
        }

        if audio.waiting() && (audio.avsync == AvSyncState::Cont || video.in_sync()) {
            return Handshake::Single {
                stream_type: StreamType::Audio,
                clock: current_clock,
            };
        }
        if video.waiting() && (video.avsync == AvSyncState::Cont || audio.in_sync()) {
            return Handshake::Single {
                stream_type: StreamType::Video,
                clock: current_clock,
            };
        }

        let threshold = self.packet_threshold(realtime, stream_count);
        let ready = |this: &HandshakeSide, other: &HandshakeSide| {
            !this.enabled
                || this.sync_state == SyncState::WaitSync
                || (this.packets == 0 && other.packets > threshold)
                || (!other.accepts_data && this.level < self.starving_level)
        };
        if !(ready(audio, video) && ready(video, audio)) {
            return Handshake::Pending;
        }

        Handshake::Joint {
            clock: self.joint_clock(audio, video, realtime).unwrap_or(current_clock),
        }
    }

    fn joint_clock(&self, audio: &HandshakeSide, video: &HandshakeSide, realtime: bool) -> Option<Timestamp> {
        let video_clock = video.started_at().map(|start| start - video.cache_total);

        let Some(audio_start) = audio.started_at() else {
            return video_clock;
        };
        let clock = if realtime {
            audio_start - audio.cache_total - self.realtime_audio_lead
        } else {
            audio_start - audio.cache_time
        };

        match video_clock {
            Some(video_clock) if video_clock < clock => Some(video_clock),
            Some(video_clock) if !realtime => {
                // video started later: move towards it, limited by how much
                // audio is queued
                let max_audio = clock + msec_to_time(self.cache_runway_ms * audio.level as i64 / 100) - audio.cache_total;
                Some(video_clock.min(max_audio.max(clock)))
            }
            _ => Some(clock),
        }
    }
}
