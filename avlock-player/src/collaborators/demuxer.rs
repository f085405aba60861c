//! Demuxer collaborators and the packets they produce

use super::input::InputStream;
use crate::error::{Error, Result};
use crate::streams::StreamFlags;
use avlock_common::{StreamType, Timestamp};

/// One demultiplexed packet
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DemuxPacket {
    pub stream_id: i32,
    pub demuxer_id: i32,
    pub dts: Option<Timestamp>,
    pub pts: Option<Timestamp>,
    pub duration: Option<Timestamp>,
    pub data: Vec<u8>,
}

impl DemuxPacket {
    pub fn new(stream_id: i32, dts: Option<Timestamp>, pts: Option<Timestamp>) -> Self {
        Self {
            stream_id,
            demuxer_id: 0,
            dts,
            pts,
            duration: None,
            data: Vec::new(),
        }
    }

    /// Shift both timestamps by `-correction`
    pub fn apply_correction(&mut self, correction: Timestamp) {
        if let Some(dts) = self.dts.as_mut() {
            *dts -= correction;
        }
        if let Some(pts) = self.pts.as_mut() {
            *pts -= correction;
        }
    }
}

/// Outcome of a demuxer read
#[derive(Debug, Clone, PartialEq)]
pub enum DemuxRead {
    Packet(DemuxPacket),
    /// Stream layout changed; re-enumerate streams
    StreamChange,
    EndOfStream,
}

/// Description of one elementary stream as reported by a demuxer or navigator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamInfo {
    pub id: i32,
    pub demuxer_id: i32,
    /// Demuxer stream id a navigator entry maps to (navigator listings only)
    pub physical_id: i32,
    pub stream_type: Option<StreamType>,
    pub language: String,
    pub flags: StreamFlags,
    pub codec: String,
    pub channels: u32,
    pub sample_rate: u32,
    pub bitrate: u32,
    pub width: u32,
    pub height: u32,
    pub fps_rate: u32,
    pub fps_scale: u32,
    pub name: String,
    /// Incremented by the demuxer whenever codec parameters change
    pub changes: u32,
    pub disabled: bool,
}

/// Container demultiplexer
pub trait Demuxer: Send {
    fn read(&mut self) -> DemuxRead;

    fn streams(&self) -> Vec<StreamInfo>;

    fn stream(&self, demuxer_id: i32, id: i32) -> Option<StreamInfo>;

    fn enable_stream(&mut self, demuxer_id: i32, id: i32, enable: bool);

    /// Duration in milliseconds, 0 when unknown
    fn stream_length_ms(&self) -> i64;

    /// Seek to `time_ms`; returns the start pts of the new position if known
    fn seek_time(&mut self, time_ms: i64, backward: bool) -> Result<Option<Timestamp>>;

    fn set_speed(&mut self, _speed: i32) {}

    /// Restrict demuxing to one program of a multi-program stream
    fn set_program(&mut self, _program: i32) {}

    fn abort(&mut self) {}

    fn flush(&mut self) {}

    fn file_name(&self) -> String;

    fn chapter_count(&self) -> usize {
        0
    }

    /// Current chapter, 1-based; 0 when the container has no chapters
    fn chapter(&self) -> usize {
        0
    }

    fn chapter_name(&self, _chapter: usize) -> String {
        String::new()
    }

    fn chapter_pos_ms(&self, _chapter: usize) -> i64 {
        0
    }

    fn seek_chapter(&mut self, chapter: usize) -> Result<Option<Timestamp>> {
        Err(Error::Seek(format!("chapter {} not supported", chapter)))
    }
}

/// Closed-caption extractor fed with video packets
pub trait CaptionDemuxer: Send {
    /// Feed one video packet, returning any caption packets it carried
    fn feed(&mut self, video_packet: &DemuxPacket) -> Vec<DemuxPacket>;

    fn streams(&self) -> Vec<StreamInfo>;

    /// True once after new caption streams were discovered
    fn take_new_streams(&mut self) -> bool;
}

/// Builds demuxers for the session
pub trait DemuxerFactory: Send {
    fn open_demuxer(&mut self, input: &mut dyn InputStream) -> Result<Box<dyn Demuxer>>;

    fn open_subtitle_demuxer(&mut self, path: &str) -> Result<Box<dyn Demuxer>> {
        Err(Error::Demux(format!("no subtitle demuxer for {}", path)))
    }

    fn open_caption_demuxer(&mut self) -> Option<Box<dyn CaptionDemuxer>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_correction_keeps_unknown_timestamps() {
        let mut packet = DemuxPacket::new(1, Some(5_000_000), None);
        packet.apply_correction(4_000_000);
        assert_eq!(packet.dts, Some(1_000_000));
        assert_eq!(packet.pts, None);
    }
}
