//! Scripted decode/render pipeline
//!
//! Packets are queued on arrival and count as presented once the master
//! clock passes their timestamp. Audio and video pipelines report their
//! first output to the control thread after a few packets, then wait for the
//! engine's resync before presenting anything.

use crate::collaborators::{PipelineMessage, StreamHint, StreamPlayer};
use crate::playback::clock::MasterClock;
use crate::playback::messages::{ControlMessage, ControlSender};
use avlock_common::timing::{Timestamp, PLAYSPEED_NORMAL};
use avlock_common::StreamType;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Everything a pipeline was asked to do, for assertions
#[derive(Debug, Clone, Default)]
pub struct PipelineRecord {
    pub opened: Vec<StreamHint>,
    pub refused: u32,
    pub closes: u32,
    pub packets: u64,
    pub dropped: u64,
    pub muted: u64,
    /// First presentable timestamp queued since the last flush or reset
    pub first_pts: Option<Timestamp>,
    pub resyncs: Vec<Timestamp>,
    pub resets: u32,
    pub flushes: u32,
    pub synchronizes: u32,
    pub speeds: Vec<i32>,
    pub eof: bool,
    pub subtitle_visible: Option<bool>,
}

/// Shared view on a [`SimPipeline`]'s record
#[derive(Debug, Clone, Default)]
pub struct PipelineProbe {
    record: Arc<Mutex<PipelineRecord>>,
}

impl PipelineProbe {
    fn lock(&self) -> MutexGuard<'_, PipelineRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self) -> PipelineRecord {
        self.lock().clone()
    }

    /// Codec of the most recently opened stream
    pub fn codec(&self) -> Option<String> {
        self.lock().opened.last().map(|hint| hint.codec.clone())
    }

    pub fn opened_ids(&self) -> Vec<i32> {
        self.lock().opened.iter().map(|hint| hint.id).collect()
    }
}

/// Pipeline for one stream type
pub struct SimPipeline {
    stream_type: StreamType,
    tx: ControlSender,
    clock: Arc<MasterClock>,
    /// Queue size in packets
    capacity: usize,
    /// Packets queued before the first output is reported
    start_packets: usize,
    refused_codecs: Vec<String>,

    /// Timestamps of queued, presentable packets
    queue: VecDeque<Timestamp>,
    last_presented: Option<Timestamp>,
    open: bool,
    started: bool,
    synced: bool,
    eof: bool,
    speed: i32,
    probe: PipelineProbe,
}

impl SimPipeline {
    pub fn new(stream_type: StreamType, tx: ControlSender, clock: Arc<MasterClock>) -> Self {
        Self {
            stream_type,
            tx,
            clock,
            capacity: 50,
            start_packets: 8,
            refused_codecs: Vec::new(),
            queue: VecDeque::new(),
            last_presented: None,
            open: false,
            started: false,
            synced: false,
            eof: false,
            speed: PLAYSPEED_NORMAL,
            probe: PipelineProbe::default(),
        }
    }

    pub fn with_capacity(mut self, packets: usize) -> Self {
        self.capacity = packets.max(1);
        self.start_packets = self.start_packets.min(self.capacity);
        self
    }

    pub fn with_start_packets(mut self, packets: usize) -> Self {
        self.start_packets = packets.clamp(1, self.capacity);
        self
    }

    /// Refuse to open streams of `codec`
    pub fn refusing(mut self, codec: &str) -> Self {
        self.refused_codecs.push(codec.to_string());
        self
    }

    pub fn probe(&self) -> PipelineProbe {
        self.probe.clone()
    }

    /// Audio and video wait for the engine's resync; other types follow the clock
    fn presenting(&self) -> bool {
        self.open && (self.synced || !self.stream_type.is_av())
    }

    fn presented(&self, pts: Timestamp, clock: Timestamp) -> bool {
        if self.speed < 0 {
            pts >= clock
        } else {
            pts <= clock
        }
    }

    fn pending(&self) -> usize {
        if !self.presenting() {
            return self.queue.len();
        }
        let clock = self.clock.get_clock();
        self.queue.iter().filter(|pts| !self.presented(**pts, clock)).count()
    }

    fn prune(&mut self) {
        if !self.presenting() {
            return;
        }
        let clock = self.clock.get_clock();
        while let Some(pts) = self.queue.front().copied() {
            if !self.presented(pts, clock) {
                break;
            }
            self.last_presented = self.queue.pop_front();
        }
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.started = false;
        self.synced = false;
        self.probe.lock().first_pts = None;
    }

    fn report_started(&mut self) {
        self.started = true;
        if !self.stream_type.is_av() {
            return;
        }
        let timestamp = self.queue.front().copied();
        debug!("{} pipeline started at {:?}", self.stream_type, timestamp);
        let started = ControlMessage::PipelineStarted {
            player: self.stream_type,
            timestamp,
            cache_time: 0,
            cache_total: 0,
        };
        if self.tx.send(started).is_err() {
            debug!("Control thread gone, start of {} not reported", self.stream_type);
        }
    }
}

impl StreamPlayer for SimPipeline {
    fn open_stream(&mut self, hint: &StreamHint) -> bool {
        if self.refused_codecs.iter().any(|codec| codec == &hint.codec) {
            warn!("{} pipeline cannot decode {}", self.stream_type, hint.codec);
            self.probe.lock().refused += 1;
            return false;
        }
        self.clear();
        self.open = true;
        self.eof = false;
        self.probe.lock().opened.push(hint.clone());
        true
    }

    fn close_stream(&mut self, _wait_for_buffers: bool) {
        if !self.open {
            return;
        }
        self.clear();
        self.open = false;
        self.probe.lock().closes += 1;
    }

    fn send_message(&mut self, message: PipelineMessage, _priority: i32) {
        self.prune();
        match message {
            PipelineMessage::Packet { packet, drop, mute } => {
                {
                    let mut record = self.probe.lock();
                    record.packets += 1;
                    if drop {
                        record.dropped += 1;
                    }
                    if mute {
                        record.muted += 1;
                    }
                }
                let Some(pts) = packet.pts.or(packet.dts) else {
                    return;
                };
                if drop || !self.open {
                    return;
                }
                self.queue.push_back(pts);
                self.probe.lock().first_pts.get_or_insert(pts);
                if !self.started && self.queue.len() >= self.start_packets {
                    self.report_started();
                }
            }
            PipelineMessage::Resync { clock } => {
                self.synced = true;
                self.probe.lock().resyncs.push(clock);
            }
            PipelineMessage::Reset => {
                self.clear();
                self.probe.lock().resets += 1;
            }
            PipelineMessage::Eof => {
                self.eof = true;
                self.probe.lock().eof = true;
                if !self.started && !self.queue.is_empty() {
                    self.report_started();
                }
            }
            PipelineMessage::Synchronize { .. } => {
                self.probe.lock().synchronizes += 1;
            }
            PipelineMessage::SubtitleVisible(visible) => {
                self.probe.lock().subtitle_visible = Some(visible);
            }
        }
    }

    fn flush(&mut self, _sync: bool) {
        self.clear();
        self.eof = false;
        self.probe.lock().flushes += 1;
    }

    fn accepts_data(&self) -> bool {
        self.pending() < self.capacity
    }

    fn level(&self) -> i32 {
        ((self.pending() * 100) / self.capacity).min(100) as i32
    }

    fn is_stalled(&self) -> bool {
        self.open && self.synced && !self.eof && self.pending() == 0
    }

    fn has_data(&self) -> bool {
        self.open && self.pending() > 0
    }

    fn set_speed(&mut self, speed: i32) {
        self.prune();
        self.speed = speed;
        self.probe.lock().speeds.push(speed);
    }

    fn current_pts(&self) -> Option<Timestamp> {
        if !self.presenting() {
            return None;
        }
        let clock = self.clock.get_clock();
        self.queue
            .iter()
            .copied()
            .take_while(|pts| self.presented(*pts, clock))
            .last()
            .or(self.last_presented)
    }

    fn is_inited(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::DemuxPacket;
    use crate::playback::messages::control_channel;
    use avlock_common::time::ManualTimeSource;

    fn packet(ms: i64) -> PipelineMessage {
        PipelineMessage::packet(DemuxPacket::new(0, Some(ms * 1000), Some(ms * 1000)), false)
    }

    #[test]
    fn test_reports_start_then_presents_after_resync() {
        let time = Arc::new(ManualTimeSource::new(0));
        let clock = Arc::new(MasterClock::new(time.clone()));
        let (tx, mut rx) = control_channel();
        let mut pipeline = SimPipeline::new(StreamType::Video, tx, clock.clone())
            .with_capacity(10)
            .with_start_packets(2);
        assert!(pipeline.open_stream(&StreamHint::default()));

        pipeline.send_message(packet(0), 0);
        assert!(rx.try_recv().is_err());
        pipeline.send_message(packet(40), 0);
        match rx.try_recv() {
            Ok(ControlMessage::PipelineStarted { player, timestamp, .. }) => {
                assert_eq!(player, StreamType::Video);
                assert_eq!(timestamp, Some(0));
            }
            other => panic!("expected a start notification, got {:?}", other),
        }

        assert_eq!(pipeline.level(), 20);
        time.advance_ms(100);
        assert_eq!(pipeline.level(), 20, "nothing presents before the resync");

        pipeline.send_message(PipelineMessage::Resync { clock: 0 }, 1);
        clock.discontinuity(0);
        time.advance_ms(20);
        assert_eq!(pipeline.level(), 10);
        assert_eq!(pipeline.current_pts(), Some(0));
        time.advance_ms(40);
        assert!(!pipeline.has_data());
        assert!(pipeline.is_stalled());
    }

    #[test]
    fn test_refused_codec() {
        let clock = Arc::new(MasterClock::new(Arc::new(ManualTimeSource::new(0))));
        let (tx, _rx) = control_channel();
        let mut pipeline = SimPipeline::new(StreamType::Audio, tx, clock).refusing("dts");
        let hint = StreamHint {
            codec: "dts".to_string(),
            ..Default::default()
        };
        assert!(!pipeline.open_stream(&hint));
        assert_eq!(pipeline.probe().record().refused, 1);
        assert!(!pipeline.is_inited());
    }

    #[test]
    fn test_full_queue_refuses_data() {
        let clock = Arc::new(MasterClock::new(Arc::new(ManualTimeSource::new(0))));
        let (tx, _rx) = control_channel();
        let mut pipeline = SimPipeline::new(StreamType::Audio, tx, clock).with_capacity(3);
        pipeline.open_stream(&StreamHint::default());
        for ms in [0, 32, 64] {
            pipeline.send_message(packet(ms), 0);
        }
        assert!(!pipeline.accepts_data());
        assert_eq!(pipeline.level(), 100);
        pipeline.flush(true);
        assert!(pipeline.accepts_data());
        assert_eq!(pipeline.probe().record().flushes, 1);
    }
}
