//! Scripted collaborators and a virtual-time scenario runner
//!
//! **Purpose:** Exercise the engine without real media. Inputs, demuxers and
//! pipelines here follow a declarative [`SimMediaSpec`]; the scenario runner
//! drives one session on a [`ManualTimeSource`](avlock_common::time::ManualTimeSource)
//! so hours of playback run in milliseconds.
//!
//! **Module Structure:**
//! - `input.rs`: SimInput and the optional disc navigator / display-time capabilities
//! - `demuxer.rs`: Media description, SimDemuxer and its factory
//! - `pipeline.rs`: SimPipeline consuming packets against the master clock
//! - `scenario.rs`: TOML scenario files and the stepping runner

pub mod demuxer;
pub mod input;
pub mod pipeline;
pub mod scenario;

pub use demuxer::{SimChapter, SimDemuxer, SimDemuxerFactory, SimJump, SimMediaSpec, SimStreamChange, SimStreamSpec};
pub use input::{SimDisplayTime, SimInput, SimNavigator};
pub use pipeline::{PipelineProbe, SimPipeline};
pub use scenario::{Scenario, ScenarioCommand, ScenarioReport, ScenarioRunner};
