//! Core engine - construction, control loop, session open and exit
//!
//! **Responsibilities:**
//! - PlayerEngine struct definition and initialization
//! - One control-loop iteration (`step`) and the blocking `run` driver
//! - Session open sequence (input, navigator, demuxer, default streams, EDL start)
//! - End-of-input handling and the single terminal outcome

use crate::collaborators::{
    CaptionDemuxer, Demuxer, DemuxerFactory, DisplayTime, InputStream, MenuNavigator, NextStream,
    PipelineMessage, PipelineSet,
};
use crate::config::PlayerConfig;
use crate::error::Result;
use crate::playback::caching::CachingMachine;
use crate::playback::clock::MasterClock;
use crate::playback::clock_sync::ClockHandshake;
use crate::playback::continuity::ContinuityCorrector;
use crate::playback::cursor::Cursors;
use crate::playback::edl::{EditAction, EditDecisionList};
use crate::playback::messages::{ControlMessage, ControlReceiver, ControlSender, OpenOptions};
use crate::playback::scene_skip::AutoSkipScheduler;
use crate::playback::trick_play::TrickPlayMonitor;
use crate::state::SharedState;
use crate::streams::{SelectionStreams, SourceId, SourceKind};
use avlock_common::events::{CachingState, PlayerEvent, SessionOutcome};
use avlock_common::timing::{msec_to_time, Timestamp, PLAYSPEED_NORMAL, PLAYSPEED_PAUSE};
use avlock_common::StreamType;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Collaborators owned by one playback session
pub struct SessionParts {
    pub input: Box<dyn InputStream>,
    pub factory: Box<dyn DemuxerFactory>,
    pub pipelines: PipelineSet,
    /// Clock shared with the pipelines
    pub clock: Arc<MasterClock>,
}

/// Result of one control-loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Work was done; step again right away
    Progress,
    /// Nothing useful to do for the given delay
    Idle(Duration),
    /// Session is over; further steps return the same outcome
    Finished(SessionOutcome),
}

/// Playback synchronization engine
///
/// Owns every cursor, the registry and all collaborators. Only the control
/// thread calls into it; the outside world talks to it through
/// [`ControlMessage`]s and reads the published [`SharedState`].
pub struct PlayerEngine {
    pub(super) config: PlayerConfig,
    pub(super) shared: Arc<SharedState>,
    pub(super) rx: ControlReceiver,
    /// Kept so the inbound queue outlives every external sender
    pub(super) tx: ControlSender,
    /// Drained but unhandled messages, plus seeks posted by the engine itself
    pub(super) pending: VecDeque<ControlMessage>,
    pub(super) clock: Arc<MasterClock>,

    pub(super) input: Box<dyn InputStream>,
    pub(super) factory: Box<dyn DemuxerFactory>,
    pub(super) demuxer: Option<Box<dyn Demuxer>>,
    pub(super) subtitle_demuxers: BTreeMap<SourceId, Box<dyn Demuxer>>,
    pub(super) caption_demuxer: Option<Box<dyn CaptionDemuxer>>,
    pub(super) navigator: Option<Arc<dyn MenuNavigator>>,
    pub(super) display_time: Option<Arc<dyn DisplayTime>>,
    pub(super) pipelines: PipelineSet,

    pub(super) registry: SelectionStreams,
    pub(super) demux_source: SourceId,
    pub(super) nav_source: SourceId,
    pub(super) caption_source: SourceId,
    pub(super) cursors: Cursors,
    /// Type index last chosen through SetStream, per stream type
    pub(super) preferred_index: [Option<i32>; 6],

    pub(super) continuity: ContinuityCorrector,
    pub(super) caching: CachingMachine,
    pub(super) handshake: ClockHandshake,
    pub(super) trick_play: TrickPlayMonitor,
    pub(super) auto_skip: AutoSkipScheduler,
    pub(super) edl: EditDecisionList,

    pub(super) play_speed: i32,
    pub(super) demuxer_speed: i32,
    pub(super) is_tempo: bool,
    /// Absolute clock time before which stall checks stay quiet
    pub(super) resync_deadline: Timestamp,
    pub(super) last_seek_abs: Option<Timestamp>,
    /// Absolute clock time of the next periodic publication
    pub(super) next_publish: Timestamp,
    /// dts of the last routed audio/video packet (corrected timeline)
    pub(super) state_dts: Option<Timestamp>,
    /// Playback time carried by the last published snapshot
    pub(super) published_time_ms: i64,
    pub(super) av_started: bool,
    pub(super) has_video: bool,
    pub(super) has_audio: bool,
    pub(super) subtitles_visible: bool,
    pub(super) player_state: Option<String>,
    pub(super) opened: bool,
    pub(super) finished: Option<SessionOutcome>,
}

impl PlayerEngine {
    /// Create an engine for one session
    ///
    /// Nothing is opened until an `Open` message arrives on `rx`.
    pub fn new(
        config: PlayerConfig,
        parts: SessionParts,
        shared: Arc<SharedState>,
        tx: ControlSender,
        rx: ControlReceiver,
    ) -> Self {
        let tuning = &config.sync;
        let file_name = parts.input.file_name();
        let mut registry = SelectionStreams::new();
        let demux_source = registry.source(SourceKind::Demux, &file_name);
        let nav_source = registry.source(SourceKind::DiscNav, &file_name);
        let caption_source = registry.source(SourceKind::EmbeddedCc, &file_name);
        let now = parts.clock.absolute();

        Self {
            cursors: Cursors::new(tuning.default_packet_duration()),
            continuity: ContinuityCorrector::new(tuning),
            caching: CachingMachine::new(tuning),
            handshake: ClockHandshake::new(tuning),
            trick_play: TrickPlayMonitor::new(tuning),
            auto_skip: AutoSkipScheduler::new(),
            edl: EditDecisionList::default(),
            subtitles_visible: config.selection.subtitles_on,
            config,
            shared,
            rx,
            tx,
            pending: VecDeque::new(),
            clock: parts.clock,
            input: parts.input,
            factory: parts.factory,
            demuxer: None,
            subtitle_demuxers: BTreeMap::new(),
            caption_demuxer: None,
            navigator: None,
            display_time: None,
            pipelines: parts.pipelines,
            registry,
            demux_source,
            nav_source,
            caption_source,
            preferred_index: [None; 6],
            play_speed: PLAYSPEED_NORMAL,
            demuxer_speed: PLAYSPEED_NORMAL,
            is_tempo: false,
            resync_deadline: now,
            last_seek_abs: None,
            next_publish: now,
            state_dts: None,
            published_time_ms: 0,
            av_started: false,
            has_video: false,
            has_audio: false,
            player_state: None,
            opened: false,
            finished: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Sender feeding this engine's inbound queue
    pub fn sender(&self) -> ControlSender {
        self.tx.clone()
    }

    /// Step until the session finishes, sleeping whenever the engine is idle
    pub fn run(mut self) -> SessionOutcome {
        info!("Control loop started for session {}", self.shared.session_id);
        loop {
            match self.step() {
                StepOutcome::Progress => {}
                StepOutcome::Idle(delay) => std::thread::sleep(delay),
                StepOutcome::Finished(outcome) => return outcome,
            }
        }
    }

    /// One control-loop iteration
    ///
    /// Handles queued messages, advances the caching/sync machinery, then
    /// reads and routes at most one packet.
    pub fn step(&mut self) -> StepOutcome {
        if let Some(outcome) = &self.finished {
            return StepOutcome::Finished(outcome.clone());
        }
        if self.shared.is_aborted() {
            return self.exit(SessionOutcome::Stopped);
        }

        self.drain_inbox();
        if let Err(e) = self.handle_messages() {
            error!("Session failed: {}", e);
            return self.exit(SessionOutcome::Error {
                message: e.to_string(),
            });
        }
        if self.shared.is_aborted() {
            return self.exit(SessionOutcome::Stopped);
        }
        if !self.opened {
            return StepOutcome::Idle(self.queue_idle());
        }

        if self.demuxer.is_none() {
            if self.input.is_eof() {
                return self.exit(SessionOutcome::Ended);
            }
            if let Err(e) = self.open_demux_stream() {
                error!("Failed to reopen demuxer: {}", e);
                return self.exit(SessionOutcome::Error {
                    message: e.to_string(),
                });
            }
            self.open_default_streams(true);
            self.update_play_state(true);
            return StepOutcome::Progress;
        }

        self.handle_play_speed();
        self.update_play_state(false);

        if self.queues_full() {
            if self.play_speed == PLAYSPEED_PAUSE && self.demuxer_speed != PLAYSPEED_PAUSE {
                debug!("Queues full while paused, pausing demuxer");
                self.set_demuxer_speed(PLAYSPEED_PAUSE);
            }
            return StepOutcome::Idle(self.queue_idle());
        }

        match self.read_packet() {
            super::router::ReadResult::Packet(packet, source) => {
                self.process_packet(packet, source);
                StepOutcome::Progress
            }
            super::router::ReadResult::Handled => StepOutcome::Progress,
            super::router::ReadResult::EndOfStream => self.handle_end_of_stream(),
        }
    }

    fn queue_idle(&self) -> Duration {
        Duration::from_millis(self.config.sync.full_queue_idle_ms)
    }

    /// An active audio or video pipeline refuses more data
    pub(super) fn queues_full(&self) -> bool {
        [StreamType::Audio, StreamType::Video]
            .into_iter()
            .any(|t| self.cursors.get(t).is_active() && !self.pipelines.accepts_data(t))
    }

    pub(super) fn post(&mut self, message: ControlMessage) {
        self.pending.push_back(message);
    }

    pub(super) fn set_demuxer_speed(&mut self, speed: i32) {
        self.demuxer_speed = speed;
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.set_speed(speed);
        }
    }

    /// Open the input and start the session
    pub(super) fn open_session(&mut self, options: OpenOptions) -> Result<()> {
        if self.opened {
            warn!("Session already open, ignoring Open");
            return Ok(());
        }

        let file_name = self.input.file_name();
        info!("Opening input {}", file_name);
        self.input.open()?;

        self.navigator = self.input.navigator();
        self.display_time = self.input.display_time();
        if let Some(state) = options.player_state.as_deref() {
            match &self.navigator {
                Some(nav) if nav.set_state(state) => debug!("Restored navigator state"),
                Some(_) => warn!("Navigator rejected stored state"),
                None => debug!("Stored player state ignored, input has no navigator"),
            }
        }
        self.player_state = options.player_state.clone();

        self.open_demux_stream()?;
        self.caption_demuxer = self.factory.open_caption_demuxer();
        for path in &options.subtitle_files {
            self.add_subtitle_file(path);
        }
        self.open_default_streams(true);

        if let Some(edl) = options.edl {
            info!("Loaded {} edit decisions", edl.edits().len());
            self.edl = edl;
        }

        self.opened = true;
        self.shared.broadcast_event(PlayerEvent::PlaybackStarted {
            session_id: self.shared.session_id,
            file_name,
            timestamp: chrono::Utc::now(),
        });

        let start_ms = self.startup_time_ms(options.start_time_ms);
        if start_ms > 0 {
            self.seek_to_start(start_ms);
        }
        self.set_caching(CachingState::Flush);
        self.update_play_state(true);
        Ok(())
    }

    /// Media time playback starts from
    ///
    /// A resume time is given on the cut timeline. Without one, a cut or
    /// commercial break covering time 0 is skipped.
    fn startup_time_ms(&mut self, resume_ms: Option<i64>) -> i64 {
        if let Some(resume) = resume_ms.filter(|ms| *ms > 0) {
            return self.edl.restore_cut_time(resume);
        }

        let start = self.edl.start_time_ms();
        if let Some(edit) = self.edl.edit_at(0) {
            if edit.action == EditAction::CommercialBreak {
                let (start_ms, end_ms) = (edit.start_ms, edit.end_ms);
                self.auto_skip.mark_commercial_break(start_ms, end_ms);
            }
        }
        start
    }

    fn seek_to_start(&mut self, start_ms: i64) {
        let result = match self.demuxer.as_mut() {
            Some(demuxer) => demuxer.seek_time(start_ms, true),
            None => return,
        };
        match result {
            Ok(start) => {
                info!("Starting demuxer from {}ms", start_ms);
                for (source, demuxer) in self.subtitle_demuxers.iter_mut() {
                    if let Err(e) = demuxer.seek_time(start_ms, true) {
                        debug!("Subtitle demuxer {} failed to seek to start: {}", source, e);
                    }
                }
                let start = start.unwrap_or_else(|| msec_to_time(start_ms));
                self.flush_buffers(Some(start), true, true, false);
            }
            Err(e) => warn!("Failed to start demuxing from {}ms: {}", start_ms, e),
        }
    }

    fn handle_end_of_stream(&mut self) -> StepOutcome {
        let idle = Duration::from_millis(self.config.sync.eof_idle_ms);
        if self.play_speed == PLAYSPEED_PAUSE {
            return StepOutcome::Idle(idle);
        }

        match self.input.next_stream() {
            NextStream::Open => {
                info!("Input switched to a new inner stream, rebuilding demuxer");
                self.demuxer = None;
                self.set_caching(CachingState::Done);
                return StepOutcome::Progress;
            }
            NextStream::Retry => return StepOutcome::Idle(idle),
            NextStream::None => {}
        }

        for stream_type in StreamType::ALL {
            let cursor = self.cursors.get_mut(stream_type);
            if cursor.inited {
                cursor.inited = false;
                self.pipelines.send(stream_type, PipelineMessage::Eof, 0);
            }
        }
        self.set_caching(CachingState::Done);

        if self.pipelines.has_data(StreamType::Audio) || self.pipelines.has_data(StreamType::Video) {
            return StepOutcome::Idle(idle);
        }

        info!("End of input reached");
        self.exit(SessionOutcome::Ended)
    }

    /// Tear the session down and report its outcome
    pub(super) fn exit(&mut self, outcome: SessionOutcome) -> StepOutcome {
        match &outcome {
            SessionOutcome::Ended => info!("Playback ended"),
            SessionOutcome::Stopped => info!("Playback stopped"),
            SessionOutcome::Error { message } => error!("Playback failed: {}", message),
        }

        let wait = outcome == SessionOutcome::Ended;
        self.shared.request_abort();
        for stream_type in StreamType::ALL {
            self.close_stream(stream_type, wait);
        }
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.abort();
        }
        for demuxer in self.subtitle_demuxers.values_mut() {
            demuxer.abort();
        }
        self.input.abort();

        self.update_play_state(true);
        if !self.shared.report_outcome(outcome.clone()) {
            debug!("Outcome already reported, keeping the first one");
        }
        self.pending.clear();
        let outcome = self.shared.outcome().unwrap_or(outcome);
        self.finished = Some(outcome.clone());
        StepOutcome::Finished(outcome)
    }
}
