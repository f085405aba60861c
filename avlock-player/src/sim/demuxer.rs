//! Scripted demuxer
//!
//! A [`SimMediaSpec`] describes a container: its streams with a fixed packet
//! interval, timestamp jumps, mid-file codec changes and chapters. The
//! demuxer interleaves packets of every stream by timestamp.

use crate::collaborators::{DemuxPacket, DemuxRead, Demuxer, DemuxerFactory, InputStream, StreamInfo};
use crate::error::{Error, Result};
use crate::streams::StreamFlags;
use avlock_common::timing::{msec_to_time, Timestamp, PLAYSPEED_NORMAL};
use avlock_common::StreamType;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

fn default_interval_ms() -> i64 {
    40
}

/// One elementary stream of a simulated container
#[derive(Debug, Clone, Deserialize)]
pub struct SimStreamSpec {
    pub id: i32,
    #[serde(default)]
    pub demuxer_id: i32,
    pub kind: StreamType,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub forced: bool,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub hearing_impaired: bool,
    #[serde(default)]
    pub channels: u32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Frames per second (video)
    #[serde(default)]
    pub fps: u32,
    /// Distance between two packets
    #[serde(default = "default_interval_ms")]
    pub interval_ms: i64,
    /// Timestamp of the first packet
    #[serde(default)]
    pub start_ms: i64,
}

impl SimStreamSpec {
    pub fn new(id: i32, kind: StreamType, codec: &str) -> Self {
        Self {
            id,
            demuxer_id: 0,
            kind,
            language: String::new(),
            codec: codec.to_string(),
            default: false,
            forced: false,
            original: false,
            hearing_impaired: false,
            channels: 0,
            width: 0,
            height: 0,
            fps: 0,
            interval_ms: default_interval_ms(),
            start_ms: 0,
        }
    }

    pub fn video(id: i32, codec: &str) -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 25,
            ..Self::new(id, StreamType::Video, codec)
        }
    }

    pub fn audio(id: i32, codec: &str, language: &str, channels: u32) -> Self {
        Self {
            language: language.to_string(),
            channels,
            interval_ms: 32,
            ..Self::new(id, StreamType::Audio, codec)
        }
    }

    pub fn subtitle(id: i32, codec: &str, language: &str) -> Self {
        Self {
            language: language.to_string(),
            interval_ms: 2000,
            ..Self::new(id, StreamType::Subtitle, codec)
        }
    }

    pub fn flagged_default(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn flagged_forced(mut self) -> Self {
        self.forced = true;
        self
    }

    fn flags(&self) -> StreamFlags {
        let mut flags = StreamFlags::NONE;
        for (set, flag) in [
            (self.default, StreamFlags::DEFAULT),
            (self.forced, StreamFlags::FORCED),
            (self.original, StreamFlags::ORIGINAL),
            (self.hearing_impaired, StreamFlags::HEARING_IMPAIRED),
        ] {
            if set {
                flags.insert(flag);
            }
        }
        flags
    }
}

/// Timestamp discontinuity: from media time `at_ms` on, timestamps shift by `offset_ms`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimJump {
    pub at_ms: i64,
    pub offset_ms: i64,
}

/// Codec change of one stream at media time `at_ms`
#[derive(Debug, Clone, Deserialize)]
pub struct SimStreamChange {
    pub at_ms: i64,
    pub stream_id: i32,
    pub codec: String,
    #[serde(default)]
    pub channels: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimChapter {
    pub name: String,
    pub start_ms: i64,
}

/// Description of a simulated container
#[derive(Debug, Clone, Deserialize)]
pub struct SimMediaSpec {
    pub duration_ms: i64,
    #[serde(default)]
    pub streams: Vec<SimStreamSpec>,
    #[serde(default)]
    pub jumps: Vec<SimJump>,
    #[serde(default)]
    pub stream_changes: Vec<SimStreamChange>,
    #[serde(default)]
    pub chapters: Vec<SimChapter>,
}

impl SimMediaSpec {
    pub fn new(duration_ms: i64) -> Self {
        Self {
            duration_ms,
            streams: Vec::new(),
            jumps: Vec::new(),
            stream_changes: Vec::new(),
            chapters: Vec::new(),
        }
    }

    /// Typical movie: one video and one audio stream
    pub fn movie(duration_ms: i64) -> Self {
        Self::new(duration_ms)
            .with_stream(SimStreamSpec::video(0, "h264"))
            .with_stream(SimStreamSpec::audio(1, "ac3", "eng", 6).flagged_default())
    }

    pub fn with_stream(mut self, stream: SimStreamSpec) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn with_jump(mut self, at_ms: i64, offset_ms: i64) -> Self {
        self.jumps.push(SimJump { at_ms, offset_ms });
        self
    }

    pub fn with_stream_change(mut self, at_ms: i64, stream_id: i32, codec: &str) -> Self {
        self.stream_changes.push(SimStreamChange {
            at_ms,
            stream_id,
            codec: codec.to_string(),
            channels: None,
        });
        self
    }

    pub fn with_chapter(mut self, name: &str, start_ms: i64) -> Self {
        self.chapters.push(SimChapter {
            name: name.to_string(),
            start_ms,
        });
        self
    }
}

#[derive(Debug, Clone)]
struct StreamCursor {
    spec: SimStreamSpec,
    /// Media time of the next packet
    next_ms: i64,
    changes: u32,
    enabled: bool,
}

impl StreamCursor {
    /// First packet time at or around `time_ms`
    fn align(&self, time_ms: i64, backward: bool) -> i64 {
        let interval = self.spec.interval_ms.max(1);
        let rel = (time_ms - self.spec.start_ms).max(0);
        let steps = if backward {
            rel / interval
        } else {
            (rel + interval - 1) / interval
        };
        self.spec.start_ms + steps * interval
    }

    fn info(&self) -> StreamInfo {
        let spec = &self.spec;
        StreamInfo {
            id: spec.id,
            demuxer_id: spec.demuxer_id,
            physical_id: spec.id,
            stream_type: Some(spec.kind),
            language: spec.language.clone(),
            flags: spec.flags(),
            codec: spec.codec.clone(),
            channels: spec.channels,
            sample_rate: if spec.kind == StreamType::Audio { 48_000 } else { 0 },
            width: spec.width,
            height: spec.height,
            fps_rate: spec.fps,
            fps_scale: if spec.fps > 0 { 1 } else { 0 },
            changes: self.changes,
            ..Default::default()
        }
    }
}

/// Demuxer playing back a [`SimMediaSpec`]
pub struct SimDemuxer {
    file_name: String,
    duration_ms: i64,
    streams: Vec<StreamCursor>,
    jumps: Vec<SimJump>,
    /// Changes not fired yet, ordered by time
    pending_changes: VecDeque<SimStreamChange>,
    chapters: Vec<SimChapter>,
    position_ms: i64,
    speed: i32,
    aborted: bool,
}

impl SimDemuxer {
    pub fn new(file_name: impl Into<String>, spec: SimMediaSpec) -> Self {
        let mut changes = spec.stream_changes;
        changes.sort_by_key(|c| c.at_ms);
        let mut jumps = spec.jumps;
        jumps.sort_by_key(|j| j.at_ms);
        Self {
            file_name: file_name.into(),
            duration_ms: spec.duration_ms,
            streams: spec
                .streams
                .into_iter()
                .map(|spec| StreamCursor {
                    next_ms: spec.start_ms,
                    spec,
                    changes: 0,
                    enabled: true,
                })
                .collect(),
            jumps,
            pending_changes: changes.into(),
            chapters: spec.chapters,
            position_ms: 0,
            speed: PLAYSPEED_NORMAL,
            aborted: false,
        }
    }

    /// Timestamp the container writes for media time `ms`
    fn timestamp(&self, ms: i64) -> Timestamp {
        let shift: i64 = self.jumps.iter().filter(|j| j.at_ms <= ms).map(|j| j.offset_ms).sum();
        msec_to_time(ms + shift)
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    pub fn is_enabled(&self, demuxer_id: i32, id: i32) -> bool {
        self.streams
            .iter()
            .any(|s| s.spec.demuxer_id == demuxer_id && s.spec.id == id && s.enabled)
    }

    fn next_stream(&self) -> Option<usize> {
        self.streams
            .iter()
            .enumerate()
            .filter(|(_, s)| s.next_ms < self.duration_ms)
            .min_by_key(|(_, s)| s.next_ms)
            .map(|(index, _)| index)
    }

    fn apply_change(&mut self, change: SimStreamChange) {
        if let Some(stream) = self.streams.iter_mut().find(|s| s.spec.id == change.stream_id) {
            info!("Stream {} switches to {}", change.stream_id, change.codec);
            stream.spec.codec = change.codec;
            if let Some(channels) = change.channels {
                stream.spec.channels = channels;
            }
            stream.changes += 1;
        }
    }
}

impl Demuxer for SimDemuxer {
    fn read(&mut self) -> DemuxRead {
        loop {
            if self.aborted {
                return DemuxRead::EndOfStream;
            }
            let Some(index) = self.next_stream() else {
                return DemuxRead::EndOfStream;
            };
            let next_ms = self.streams[index].next_ms;

            if self.pending_changes.front().is_some_and(|c| c.at_ms <= next_ms) {
                if let Some(change) = self.pending_changes.pop_front() {
                    self.apply_change(change);
                    return DemuxRead::StreamChange;
                }
            }

            let stream = &mut self.streams[index];
            stream.next_ms += stream.spec.interval_ms.max(1);
            if !stream.enabled {
                continue;
            }
            let (id, demuxer_id, interval_ms) = (stream.spec.id, stream.spec.demuxer_id, stream.spec.interval_ms);

            self.position_ms = next_ms;
            let ts = self.timestamp(next_ms);
            let mut packet = DemuxPacket::new(id, Some(ts), Some(ts));
            packet.demuxer_id = demuxer_id;
            packet.duration = Some(msec_to_time(interval_ms));
            return DemuxRead::Packet(packet);
        }
    }

    fn streams(&self) -> Vec<StreamInfo> {
        self.streams.iter().map(StreamCursor::info).collect()
    }

    fn stream(&self, demuxer_id: i32, id: i32) -> Option<StreamInfo> {
        self.streams
            .iter()
            .find(|s| s.spec.demuxer_id == demuxer_id && s.spec.id == id)
            .map(StreamCursor::info)
    }

    fn enable_stream(&mut self, demuxer_id: i32, id: i32, enable: bool) {
        if let Some(stream) = self
            .streams
            .iter_mut()
            .find(|s| s.spec.demuxer_id == demuxer_id && s.spec.id == id)
        {
            stream.enabled = enable;
        }
    }

    fn stream_length_ms(&self) -> i64 {
        self.duration_ms
    }

    fn seek_time(&mut self, time_ms: i64, backward: bool) -> Result<Option<Timestamp>> {
        if time_ms < 0 || time_ms > self.duration_ms {
            return Err(Error::Seek(format!(
                "{}ms outside of {} ({}ms)",
                time_ms, self.file_name, self.duration_ms
            )));
        }
        for stream in self.streams.iter_mut() {
            stream.next_ms = stream.align(time_ms, backward);
        }
        self.position_ms = time_ms;
        debug!("{} positioned at {}ms", self.file_name, time_ms);
        Ok(Some(self.timestamp(time_ms)))
    }

    fn set_speed(&mut self, speed: i32) {
        self.speed = speed;
    }

    fn abort(&mut self) {
        self.aborted = true;
    }

    fn file_name(&self) -> String {
        self.file_name.clone()
    }

    fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    fn chapter(&self) -> usize {
        self.chapters
            .iter()
            .rposition(|c| c.start_ms <= self.position_ms)
            .map_or(0, |index| index + 1)
    }

    fn chapter_name(&self, chapter: usize) -> String {
        chapter
            .checked_sub(1)
            .and_then(|index| self.chapters.get(index))
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn chapter_pos_ms(&self, chapter: usize) -> i64 {
        chapter
            .checked_sub(1)
            .and_then(|index| self.chapters.get(index))
            .map_or(0, |c| c.start_ms)
    }

    fn seek_chapter(&mut self, chapter: usize) -> Result<Option<Timestamp>> {
        let start_ms = chapter
            .checked_sub(1)
            .and_then(|index| self.chapters.get(index))
            .map(|c| c.start_ms)
            .ok_or_else(|| Error::Seek(format!("no chapter {} in {}", chapter, self.file_name)))?;
        self.seek_time(start_ms, true)
    }
}

/// Builds [`SimDemuxer`]s; the last media description is reused for reopens
#[derive(Default)]
pub struct SimDemuxerFactory {
    media: VecDeque<SimMediaSpec>,
    last: Option<SimMediaSpec>,
    failures: u32,
    subtitles: BTreeMap<String, SimMediaSpec>,
    opened: Arc<AtomicU32>,
}

impl SimDemuxerFactory {
    pub fn new(media: SimMediaSpec) -> Self {
        Self {
            media: VecDeque::from([media]),
            ..Default::default()
        }
    }

    /// Media for the next inner stream of the input
    pub fn then(mut self, media: SimMediaSpec) -> Self {
        self.media.push_back(media);
        self
    }

    /// Fail the first `count` demuxer constructions
    pub fn failing(mut self, count: u32) -> Self {
        self.failures = count;
        self
    }

    pub fn with_subtitle_file(mut self, path: &str, media: SimMediaSpec) -> Self {
        self.subtitles.insert(path.to_string(), media);
        self
    }

    /// Counter of successfully built main demuxers
    pub fn open_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.opened)
    }
}

impl DemuxerFactory for SimDemuxerFactory {
    fn open_demuxer(&mut self, input: &mut dyn InputStream) -> Result<Box<dyn Demuxer>> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(Error::Demux(format!("{} not recognized", input.file_name())));
        }
        let media = match self.media.pop_front() {
            Some(media) => media,
            None => self
                .last
                .clone()
                .ok_or_else(|| Error::Demux("no media configured".to_string()))?,
        };
        self.last = Some(media.clone());
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimDemuxer::new(input.file_name(), media)))
    }

    fn open_subtitle_demuxer(&mut self, path: &str) -> Result<Box<dyn Demuxer>> {
        let media = self
            .subtitles
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Demux(format!("{} not found", path)))?;
        Ok(Box::new(SimDemuxer::new(path, media)))
    }
}
