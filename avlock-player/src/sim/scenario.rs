//! Scenario files and the virtual-time runner
//!
//! A scenario is a TOML document describing the input, the media, the
//! pipelines and a timeline of user commands:
//!
//! ```toml
//! [media]
//! duration_ms = 60000
//!
//! [[media.streams]]
//! id = 0
//! kind = "video"
//! codec = "h264"
//!
//! [[commands]]
//! at_ms = 5000
//! action = "seek"
//! time_ms = 30000
//! ```
//!
//! The runner steps the engine on the calling thread. Idle delays advance
//! virtual time instead of sleeping, so a session finishes as fast as the
//! engine can route packets.

use super::demuxer::{SimDemuxerFactory, SimMediaSpec};
use super::input::{SimInput, SimInputSpec};
use super::pipeline::{PipelineProbe, SimPipeline};
use crate::collaborators::PipelineSet;
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::playback::clock::MasterClock;
use crate::playback::edl::{EditDecision, EditDecisionList};
use crate::playback::engine::{PlayerEngine, SessionParts, StepOutcome};
use crate::playback::messages::{control_channel, ControlMessage, ControlSender, OpenOptions};
use crate::playback::seek::SeekRequest;
use crate::playback::snapshot::PlayStateSnapshot;
use crate::state::SharedState;
use crate::streams::SelectionStream;
use avlock_common::events::{PlayerEvent, SessionOutcome};
use avlock_common::time::{ManualTimeSource, TimeSource};
use avlock_common::StreamType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

/// Virtual time charged for one routed packet
const PROGRESS_TICK_US: i64 = 100;

/// Pipeline setup shared by every stream type
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSpec {
    pub capacity: usize,
    pub start_packets: usize,
    pub refuse_codecs: Vec<String>,
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            capacity: 50,
            start_packets: 8,
            refuse_codecs: Vec::new(),
        }
    }
}

/// Session-opening options of a scenario
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenSpec {
    pub start_time_ms: Option<i64>,
    pub player_state: Option<String>,
    pub subtitle_files: Vec<String>,
}

/// One user action
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioCommand {
    Seek {
        time_ms: i64,
        #[serde(default)]
        relative: bool,
    },
    SeekChapter {
        chapter: usize,
    },
    SetSpeed {
        speed: i32,
        #[serde(default)]
        tempo: bool,
    },
    SetStream {
        stream_type: StreamType,
        index: i32,
    },
    SetSubtitleVisible {
        visible: bool,
    },
    FrameAdvance {
        frames: u32,
    },
    AddSubtitle {
        path: String,
    },
    SetState {
        state: String,
    },
    Flush,
    Stop,
}

impl ScenarioCommand {
    pub fn into_message(self) -> ControlMessage {
        match self {
            ScenarioCommand::Seek { time_ms, relative } => {
                let request = if relative {
                    SeekRequest::by(time_ms)
                } else {
                    SeekRequest::to(time_ms)
                };
                ControlMessage::Seek(request)
            }
            ScenarioCommand::SeekChapter { chapter } => ControlMessage::SeekChapter(chapter),
            ScenarioCommand::SetSpeed { speed, tempo } => ControlMessage::SetSpeed { speed, is_tempo: tempo },
            ScenarioCommand::SetStream { stream_type, index } => ControlMessage::SetStream {
                stream_type,
                type_index: index,
            },
            ScenarioCommand::SetSubtitleVisible { visible } => ControlMessage::SetSubtitleVisible(visible),
            ScenarioCommand::FrameAdvance { frames } => ControlMessage::FrameAdvance(frames),
            ScenarioCommand::AddSubtitle { path } => ControlMessage::AddSubtitle(path),
            ScenarioCommand::SetState { state } => ControlMessage::SetState(state),
            ScenarioCommand::Flush => ControlMessage::Flush,
            ScenarioCommand::Stop => ControlMessage::Abort,
        }
    }
}

/// A command and the virtual time it is issued at
#[derive(Debug, Clone, Deserialize)]
pub struct TimedCommand {
    pub at_ms: i64,
    #[serde(flatten)]
    pub command: ScenarioCommand,
}

/// Complete scenario document
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub input: SimInputSpec,
    pub media: SimMediaSpec,
    /// Demuxer constructions that fail before one succeeds
    #[serde(default)]
    pub demuxer_failures: u32,
    /// Media of external subtitle files, by path
    #[serde(default)]
    pub subtitle_media: BTreeMap<String, SimMediaSpec>,
    #[serde(default)]
    pub pipelines: PipelineSpec,
    #[serde(default)]
    pub open: OpenSpec,
    #[serde(default)]
    pub edl: Vec<EditDecision>,
    #[serde(default)]
    pub commands: Vec<TimedCommand>,
    /// Virtual time after which the session is stopped
    #[serde(default)]
    pub max_duration_ms: Option<i64>,
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid scenario: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_toml_str(&content)?;
        if scenario.name.is_empty() {
            scenario.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("scenario")
                .to_string();
        }
        Ok(scenario)
    }

    fn max_duration_ms(&self) -> i64 {
        self.max_duration_ms
            .unwrap_or(self.media.duration_ms * 2 + 10_000)
    }
}

/// What a scenario run produced
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub outcome: SessionOutcome,
    /// Virtual time the session ran for
    pub elapsed_ms: i64,
    pub events: Vec<PlayerEvent>,
    pub snapshot: PlayStateSnapshot,
    pub streams: Vec<SelectionStream>,
}

impl ScenarioReport {
    pub fn count(&self, event_type: &str) -> usize {
        self.events.iter().filter(|e| e.event_type() == event_type).count()
    }
}

/// Steps one scenario to completion on virtual time
pub struct ScenarioRunner {
    scenario: Scenario,
    config: PlayerConfig,
    probes: BTreeMap<StreamType, PipelineProbe>,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario, config: PlayerConfig) -> Self {
        Self {
            scenario,
            config,
            probes: BTreeMap::new(),
        }
    }

    /// Probe of the pipeline of `stream_type`, available after [`ScenarioRunner::run`]
    pub fn probe(&self, stream_type: StreamType) -> Option<&PipelineProbe> {
        self.probes.get(&stream_type)
    }

    fn pipelines(&mut self, tx: &ControlSender, clock: &Arc<MasterClock>) -> PipelineSet {
        let spec = &self.scenario.pipelines;
        let mut pipelines = PipelineSet::new();
        for stream_type in [StreamType::Video, StreamType::Audio, StreamType::Subtitle] {
            let mut pipeline = SimPipeline::new(stream_type, tx.clone(), Arc::clone(clock))
                .with_capacity(spec.capacity)
                .with_start_packets(spec.start_packets);
            for codec in &spec.refuse_codecs {
                pipeline = pipeline.refusing(codec);
            }
            self.probes.insert(stream_type, pipeline.probe());
            pipelines.insert(stream_type, Box::new(pipeline));
        }
        pipelines
    }

    /// Collaborators of one session on the given time source
    pub fn session_parts(&mut self, source: Arc<dyn TimeSource>, tx: &ControlSender) -> SessionParts {
        let clock = Arc::new(MasterClock::new(source));
        let mut factory =
            SimDemuxerFactory::new(self.scenario.media.clone()).failing(self.scenario.demuxer_failures);
        for (path, media) in &self.scenario.subtitle_media {
            factory = factory.with_subtitle_file(path, media.clone());
        }
        SessionParts {
            input: Box::new(SimInput::from_spec(self.scenario.input.clone())),
            factory: Box::new(factory),
            pipelines: self.pipelines(tx, &clock),
            clock,
        }
    }

    pub fn open_options(&self) -> Result<OpenOptions> {
        let open = &self.scenario.open;
        let edl = if self.scenario.edl.is_empty() {
            None
        } else {
            Some(EditDecisionList::new(self.scenario.edl.clone())?)
        };
        Ok(OpenOptions {
            start_time_ms: open.start_time_ms,
            edl,
            player_state: open.player_state.clone(),
            subtitle_files: open.subtitle_files.clone(),
        })
    }

    /// Commands in the order they are issued
    pub fn timeline(&self) -> VecDeque<TimedCommand> {
        let mut commands = self.scenario.commands.clone();
        commands.sort_by_key(|c| c.at_ms);
        commands.into()
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn run(&mut self) -> Result<ScenarioReport> {
        let name = self.scenario.name.clone();
        info!("Running scenario '{}'", name);

        let time = Arc::new(ManualTimeSource::new(0));
        let (tx, rx) = control_channel();
        let shared = Arc::new(SharedState::new());
        let mut events = shared.subscribe_events();

        let parts = self.session_parts(time.clone(), &tx);
        let mut engine = PlayerEngine::new(self.config.clone(), parts, Arc::clone(&shared), tx.clone(), rx);
        tx.send(ControlMessage::Open(self.open_options()?))
            .map_err(|_| Error::ChannelClosed("engine dropped before open".to_string()))?;

        let mut commands = self.timeline();
        let max_ms = self.scenario.max_duration_ms();
        let mut collected = Vec::new();

        let outcome = loop {
            let now_ms = time.now_us() / 1000;
            while commands.front().is_some_and(|c| c.at_ms <= now_ms) {
                let Some(timed) = commands.pop_front() else {
                    break;
                };
                debug!("{}ms: {:?}", now_ms, timed.command);
                if timed.command == ScenarioCommand::Stop {
                    shared.request_abort();
                }
                if tx.send(timed.command.into_message()).is_err() {
                    warn!("Engine stopped listening at {}ms", now_ms);
                }
            }
            if now_ms > max_ms && !shared.is_aborted() {
                warn!("Scenario '{}' exceeded {}ms, stopping", name, max_ms);
                shared.request_abort();
            }

            match engine.step() {
                StepOutcome::Progress => time.advance(PROGRESS_TICK_US),
                StepOutcome::Idle(delay) => time.advance(delay.as_micros().max(1) as i64),
                StepOutcome::Finished(outcome) => break outcome,
            }
            drain_events(&mut events, &mut collected);
        };
        drain_events(&mut events, &mut collected);

        let elapsed_ms = time.now_us() / 1000;
        info!("Scenario '{}' finished after {}ms: {:?}", name, elapsed_ms, outcome);
        Ok(ScenarioReport {
            name,
            outcome,
            elapsed_ms,
            events: collected,
            snapshot: shared.snapshot(),
            streams: shared.streams(),
        })
    }
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<PlayerEvent>, into: &mut Vec<PlayerEvent>) {
    loop {
        match rx.try_recv() {
            Ok(event) => into.push(event),
            Err(TryRecvError::Lagged(missed)) => warn!("Missed {} events", missed),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}
