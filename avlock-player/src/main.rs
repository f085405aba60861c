//! avlock player - scenario driver
//!
//! Runs a simulated playback session described by a TOML scenario file and
//! prints the resulting report as JSON. By default the session runs on
//! virtual time; `--realtime` runs it on the wall clock through a
//! [`PlayerHandle`] and streams events as they happen.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use avlock_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use avlock_common::events::SessionOutcome;
use avlock_common::time::SystemTimeSource;
use avlock_player::config::ConfigOverrides;
use avlock_player::playback::control_channel;
use avlock_player::sim::{Scenario, ScenarioCommand, ScenarioRunner};
use avlock_player::{PlayerConfig, PlayerHandle, SharedState};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for avlock-player
#[derive(Parser, Debug)]
#[command(name = "avlock-player")]
#[command(about = "Audio/video playback synchronization engine driven by scenario files")]
#[command(version)]
struct Args {
    /// Scenario file to play
    #[arg(short, long, env = "AVLOCK_SCENARIO")]
    scenario: PathBuf,

    /// Player configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracing filter (overrides the configuration file)
    #[arg(short, long, env = "AVLOCK_LOG")]
    log_level: Option<String>,

    /// Preferred audio language
    #[arg(long)]
    audio_language: Option<String>,

    /// Preferred subtitle language
    #[arg(long)]
    subtitle_language: Option<String>,

    /// Never open audio streams
    #[arg(long)]
    video_only: bool,

    /// Run on the wall clock instead of virtual time
    #[arg(long)]
    realtime: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut config = PlayerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(ConfigOverrides {
        log_level: args.log_level.clone(),
        audio_language: args.audio_language.clone(),
        subtitle_language: args.subtitle_language.clone(),
        subtitles_on: None,
        video_only: args.video_only,
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting avlock-player {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );
    if let Some(path) = config_path.as_ref() {
        info!("Configuration: {}", path.display());
    }

    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    info!("Scenario: {}", scenario.name);

    if args.realtime {
        run_realtime(scenario, config).await
    } else {
        let report = tokio::task::spawn_blocking(move || ScenarioRunner::new(scenario, config).run())
            .await
            .context("Scenario runner panicked")?
            .context("Scenario failed")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

/// Play the scenario on the wall clock until it ends or Ctrl+C
async fn run_realtime(scenario: Scenario, config: PlayerConfig) -> Result<()> {
    let mut runner = ScenarioRunner::new(scenario, config.clone());
    let (tx, rx) = control_channel();
    let shared = Arc::new(SharedState::new());
    let mut events = shared.subscribe_events();

    let parts = runner.session_parts(Arc::new(SystemTimeSource::new()), &tx);
    let handle = PlayerHandle::spawn(config, parts, shared, tx, rx).context("Failed to start session")?;
    handle.open(runner.open_options()?)?;

    let started = tokio::time::Instant::now();
    let mut timeline = runner.timeline();
    let mut ticker = tokio::time::interval(Duration::from_millis(10));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Missed {} events", missed),
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                let now_ms = started.elapsed().as_millis() as i64;
                while timeline.front().is_some_and(|c| c.at_ms <= now_ms) {
                    if let Some(timed) = timeline.pop_front() {
                        info!("{}ms: {:?}", now_ms, timed.command);
                        if timed.command == ScenarioCommand::Stop {
                            handle.abort();
                        } else {
                            handle.send(timed.command.into_message())?;
                        }
                    }
                }
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping playback");
                handle.abort();
            },
        }
    }

    let snapshot = handle.snapshot();
    let outcome = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("Control thread join panicked")??;
    info!("Session finished: {:?}", outcome);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if let SessionOutcome::Error { message } = outcome {
        anyhow::bail!("Playback failed: {}", message);
    }
    Ok(())
}
