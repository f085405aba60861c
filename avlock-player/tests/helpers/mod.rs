//! Test helpers for avlock-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - SessionBuilder: Assemble a scenario in code and run it on virtual time
//! - SessionRun: Report plus the pipeline records of the finished session
//! - ManualSession: Step an engine built from hand-picked collaborators

#![allow(dead_code)]

use avlock_common::events::{PlayerEvent, SessionOutcome};
use avlock_common::time::{ManualTimeSource, TimeSource};
use avlock_common::StreamType;
use avlock_player::collaborators::{DemuxerFactory, InputStream, PipelineSet};
use avlock_player::playback::edl::EditDecision;
use avlock_player::playback::{control_channel, ControlMessage, ControlReceiver, ControlSender, MasterClock, StepOutcome};
use avlock_player::sim::input::SimInputSpec;
use avlock_player::sim::pipeline::PipelineRecord;
use avlock_player::sim::scenario::{OpenSpec, PipelineSpec, TimedCommand};
use avlock_player::sim::{
    PipelineProbe, Scenario, ScenarioCommand, ScenarioReport, ScenarioRunner, SimMediaSpec, SimPipeline,
};
use avlock_player::{OpenOptions, PlayerConfig, PlayerEngine, SessionParts, SharedState};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Fluent builder for one simulated session
pub struct SessionBuilder {
    scenario: Scenario,
    config: PlayerConfig,
}

impl SessionBuilder {
    pub fn new(media: SimMediaSpec) -> Self {
        Self {
            scenario: Scenario {
                name: "integration".to_string(),
                input: SimInputSpec::default(),
                media,
                demuxer_failures: 0,
                subtitle_media: BTreeMap::new(),
                pipelines: PipelineSpec::default(),
                open: OpenSpec::default(),
                edl: Vec::new(),
                commands: Vec::new(),
                max_duration_ms: None,
            },
            config: PlayerConfig::default(),
        }
    }

    /// A movie of `duration_ms` with one video and one audio stream
    pub fn movie(duration_ms: i64) -> Self {
        Self::new(SimMediaSpec::movie(duration_ms))
    }

    pub fn input(mut self, edit: impl FnOnce(&mut SimInputSpec)) -> Self {
        edit(&mut self.scenario.input);
        self
    }

    pub fn config(mut self, edit: impl FnOnce(&mut PlayerConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    pub fn demuxer_failures(mut self, count: u32) -> Self {
        self.scenario.demuxer_failures = count;
        self
    }

    pub fn refuse_codec(mut self, codec: &str) -> Self {
        self.scenario.pipelines.refuse_codecs.push(codec.to_string());
        self
    }

    pub fn subtitle_file(mut self, path: &str, media: SimMediaSpec) -> Self {
        self.scenario.subtitle_media.insert(path.to_string(), media);
        self
    }

    pub fn edit(mut self, decision: EditDecision) -> Self {
        self.scenario.edl.push(decision);
        self
    }

    pub fn start_at(mut self, time_ms: i64) -> Self {
        self.scenario.open.start_time_ms = Some(time_ms);
        self
    }

    pub fn at(mut self, at_ms: i64, command: ScenarioCommand) -> Self {
        self.scenario.commands.push(TimedCommand { at_ms, command });
        self
    }

    pub fn max_duration(mut self, ms: i64) -> Self {
        self.scenario.max_duration_ms = Some(ms);
        self
    }

    pub fn into_parts(self) -> (Scenario, PlayerConfig) {
        (self.scenario, self.config)
    }

    pub fn run(self) -> SessionRun {
        let mut runner = ScenarioRunner::new(self.scenario, self.config);
        let report = runner.run().expect("scenario should run");
        SessionRun { report, runner }
    }
}

/// A finished session
pub struct SessionRun {
    pub report: ScenarioReport,
    runner: ScenarioRunner,
}

impl SessionRun {
    pub fn pipeline(&self, stream_type: StreamType) -> PipelineRecord {
        self.runner
            .probe(stream_type)
            .map(|probe| probe.record())
            .unwrap_or_default()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.report.count(event_type)
    }

    /// Stream ids in the order their pipeline opened them
    pub fn opened_ids(&self, stream_type: StreamType) -> Vec<i32> {
        self.runner
            .probe(stream_type)
            .map(|probe| probe.opened_ids())
            .unwrap_or_default()
    }
}

pub fn seek_to(time_ms: i64) -> ScenarioCommand {
    ScenarioCommand::Seek {
        time_ms,
        relative: false,
    }
}

/// Engine session on virtual time with collaborators chosen by the test
pub struct ManualSession {
    pub time: Arc<ManualTimeSource>,
    pub clock: Arc<MasterClock>,
    pub shared: Arc<SharedState>,
    pub config: PlayerConfig,
    tx: ControlSender,
    rx: Option<ControlReceiver>,
    probes: BTreeMap<StreamType, PipelineProbe>,
}

impl ManualSession {
    pub fn new() -> Self {
        let time = Arc::new(ManualTimeSource::new(0));
        let clock = Arc::new(MasterClock::new(time.clone()));
        let (tx, rx) = control_channel();
        Self {
            time,
            clock,
            shared: Arc::new(SharedState::new()),
            config: PlayerConfig::default(),
            tx,
            rx: Some(rx),
            probes: BTreeMap::new(),
        }
    }

    /// Video, audio and subtitle pipelines reporting to this session
    pub fn pipelines(&mut self) -> PipelineSet {
        let mut pipelines = PipelineSet::new();
        for stream_type in [StreamType::Video, StreamType::Audio, StreamType::Subtitle] {
            let pipeline = SimPipeline::new(stream_type, self.tx.clone(), Arc::clone(&self.clock));
            self.probes.insert(stream_type, pipeline.probe());
            pipelines.insert(stream_type, Box::new(pipeline));
        }
        pipelines
    }

    pub fn pipeline(&self, stream_type: StreamType) -> PipelineRecord {
        self.probes
            .get(&stream_type)
            .map(|probe| probe.record())
            .unwrap_or_default()
    }

    /// Open a session and step it to completion, sending each timed message
    /// once virtual time reaches it
    pub fn run(
        &mut self,
        input: Box<dyn InputStream>,
        factory: Box<dyn DemuxerFactory>,
        timeline: Vec<(i64, ControlMessage)>,
    ) -> (SessionOutcome, Vec<PlayerEvent>) {
        let pipelines = self.pipelines();
        let parts = SessionParts {
            input,
            factory,
            pipelines,
            clock: Arc::clone(&self.clock),
        };
        let rx = self.rx.take().expect("a manual session runs once");
        let mut events = self.shared.subscribe_events();
        let mut engine = PlayerEngine::new(self.config.clone(), parts, Arc::clone(&self.shared), self.tx.clone(), rx);
        self.tx
            .send(ControlMessage::Open(OpenOptions::default()))
            .expect("engine is listening");

        let mut timeline: VecDeque<(i64, ControlMessage)> = timeline.into();
        let outcome = loop {
            let now_ms = self.time.now_us() / 1000;
            while timeline.front().is_some_and(|(at_ms, _)| *at_ms <= now_ms) {
                if let Some((_, message)) = timeline.pop_front() {
                    self.tx.send(message).expect("engine is listening");
                }
            }
            assert!(now_ms < 120_000, "session did not finish");
            match engine.step() {
                StepOutcome::Progress => self.time.advance(100),
                StepOutcome::Idle(delay) => self.time.advance(delay.as_micros().max(1) as i64),
                StepOutcome::Finished(outcome) => break outcome,
            }
        };

        let mut collected = Vec::new();
        while let Ok(event) = events.try_recv() {
            collected.push(event);
        }
        (outcome, collected)
    }
}
