//! Configuration for avlock-player
//!
//! `PlayerConfig` is loaded from TOML and covers three sections:
//! - `[logging]`: tracing filter and optional log file
//! - `[selection]`: language, accessibility and channel preferences used by
//!   the default stream selection policy
//! - `[sync]`: every numeric threshold of the synchronization engine
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`ConfigOverrides`)
//! 2. Environment variable `AVLOCK_CONFIG` (config file location)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use avlock_common::config::{load_toml_or_default, parse_toml, LoggingConfig};
use avlock_common::timing::{msec_to_time, Timestamp};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Language preference sentinel meaning "the track flagged as original"
pub const ORIGINAL_LANGUAGE: &str = "original";

/// Complete player configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub selection: SelectionPreferences,

    #[serde(default)]
    pub sync: SyncTuning,
}

/// Which subtitles are eligible for automatic selection
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleMode {
    /// Normal relevance rules
    #[default]
    ShowAll,
    /// Never select a subtitle automatically
    ShowNone,
    /// Only forced subtitles in the audio language
    ForcedOnly,
}

/// Channel layout preference for audio selection
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPreference {
    /// Prefer exactly two channels
    Stereo,
    /// Prefer the highest channel count
    #[default]
    MostChannels,
}

/// Preferences consumed by the default stream selection policy
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionPreferences {
    /// Preferred audio language (ISO 639 code, "original", or empty)
    #[serde(default)]
    pub audio_language: String,

    /// Preferred subtitle language (ISO 639 code, "original", or empty)
    #[serde(default)]
    pub subtitle_language: String,

    #[serde(default)]
    pub subtitle_mode: SubtitleMode,

    /// Show the selected subtitle unless it is irrelevant
    #[serde(default = "default_true")]
    pub subtitles_on: bool,

    #[serde(default)]
    pub audio_hearing_impaired: bool,

    #[serde(default)]
    pub audio_visual_impaired: bool,

    #[serde(default)]
    pub subtitle_hearing_impaired: bool,

    /// Honor the container's default flag ahead of channel count and codec
    #[serde(default = "default_true")]
    pub prefer_default_flag: bool,

    #[serde(default)]
    pub channel_preference: ChannelPreference,

    /// Codec priority overrides (codec name to priority, higher wins)
    #[serde(default)]
    pub codec_priority: BTreeMap<String, i32>,

    /// Never open audio streams
    #[serde(default)]
    pub video_only: bool,
}

impl Default for SelectionPreferences {
    fn default() -> Self {
        Self {
            audio_language: String::new(),
            subtitle_language: String::new(),
            subtitle_mode: SubtitleMode::default(),
            subtitles_on: true,
            audio_hearing_impaired: false,
            audio_visual_impaired: false,
            subtitle_hearing_impaired: false,
            prefer_default_flag: true,
            channel_preference: ChannelPreference::default(),
            codec_priority: BTreeMap::new(),
            video_only: false,
        }
    }
}

impl SelectionPreferences {
    /// True when the audio preference is the "original" sentinel
    pub fn audio_original(&self) -> bool {
        self.audio_language.eq_ignore_ascii_case(ORIGINAL_LANGUAGE)
    }

    /// True when the subtitle preference is the "original" sentinel
    pub fn subtitle_original(&self) -> bool {
        self.subtitle_language.eq_ignore_ascii_case(ORIGINAL_LANGUAGE)
    }
}

fn default_true() -> bool {
    true
}

/// Thresholds of the synchronization engine
///
/// Durations are milliseconds, levels are pipeline queue fill percentages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncTuning {
    /// Forward timestamp jump treated as a discontinuity
    pub forward_jump_ms: i64,
    /// Backward timestamp jump treated as a discontinuity
    pub backward_jump_ms: i64,
    /// Maximum distance between audio and video that corroborates a jump
    pub corroboration_window_ms: i64,
    /// Gate distance after which every start gate is abandoned
    pub gate_abandon_ms: i64,
    /// Queued media that counts as a full cache
    pub cache_runway_ms: i64,
    /// Minimum time between a clock resync and the next stall check
    pub resync_cooldown_ms: i64,
    /// Extra audio lead applied to realtime sources at resync
    pub realtime_audio_lead_ms: i64,
    /// Packets the other side must have before a silent side counts as absent
    pub wait_sync_packet_threshold: u32,
    /// Same as `wait_sync_packet_threshold` for realtime sources
    pub realtime_wait_sync_packet_threshold: u32,
    /// Level under which a pipeline counts as starving its counterpart
    pub starving_level_percent: i32,
    /// Both levels at or under this send a stalled seekable source back to FULL
    pub stall_level_percent: i32,
    /// Realtime audio level under which the clock is slowed down
    pub live_low_level_percent: i32,
    /// Realtime audio level over which the clock adjust is removed
    pub live_high_level_percent: i32,
    /// Clock speed adjust applied to starving realtime sources
    pub live_speed_adjust: f64,
    /// How long INIT tolerates one pipeline refusing data while the other starts
    pub init_refusal_timeout_ms: i64,
    /// Demuxer construction attempts while the input announces new streams
    pub demuxer_open_attempts: u32,
    /// Interval between play-state snapshot rebuilds
    pub play_state_interval_ms: i64,
    /// Trick-play drift that triggers a corrective seek
    pub trick_play_error_ms: i64,
    /// Upper bound of the trick-play error divisor
    pub trick_play_speed_cap: i32,
    /// Default duration estimate of a packet
    pub default_packet_duration_ms: i64,
    /// Idle delay when every pipeline queue is full
    pub full_queue_idle_ms: u64,
    /// Idle delay while draining at end of stream
    pub eof_idle_ms: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            forward_jump_ms: 1000,
            backward_jump_ms: 500,
            corroboration_window_ms: 1000,
            gate_abandon_ms: 20_000,
            cache_runway_ms: 8000,
            resync_cooldown_ms: 3000,
            realtime_audio_lead_ms: 400,
            wait_sync_packet_threshold: 20,
            realtime_wait_sync_packet_threshold: 40,
            starving_level_percent: 10,
            stall_level_percent: 50,
            live_low_level_percent: 5,
            live_high_level_percent: 10,
            live_speed_adjust: -0.01,
            init_refusal_timeout_ms: 2000,
            demuxer_open_attempts: 10,
            play_state_interval_ms: 200,
            trick_play_error_ms: 1000,
            trick_play_speed_cap: 8,
            default_packet_duration_ms: 40,
            full_queue_idle_ms: 10,
            eof_idle_ms: 100,
        }
    }
}

impl SyncTuning {
    pub fn forward_jump(&self) -> Timestamp {
        msec_to_time(self.forward_jump_ms)
    }

    pub fn backward_jump(&self) -> Timestamp {
        msec_to_time(self.backward_jump_ms)
    }

    pub fn corroboration_window(&self) -> Timestamp {
        msec_to_time(self.corroboration_window_ms)
    }

    pub fn gate_abandon(&self) -> Timestamp {
        msec_to_time(self.gate_abandon_ms)
    }

    pub fn default_packet_duration(&self) -> Timestamp {
        msec_to_time(self.default_packet_duration_ms)
    }

    /// Reject values that would disable a safety net or divide by zero
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("forward_jump_ms", self.forward_jump_ms),
            ("backward_jump_ms", self.backward_jump_ms),
            ("corroboration_window_ms", self.corroboration_window_ms),
            ("gate_abandon_ms", self.gate_abandon_ms),
            ("cache_runway_ms", self.cache_runway_ms),
            ("play_state_interval_ms", self.play_state_interval_ms),
            ("trick_play_error_ms", self.trick_play_error_ms),
            ("default_packet_duration_ms", self.default_packet_duration_ms),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(Error::Config(format!("sync.{} must be positive, got {}", name, value)));
            }
        }
        if self.demuxer_open_attempts == 0 {
            return Err(Error::Config("sync.demuxer_open_attempts must be at least 1".to_string()));
        }
        if self.trick_play_speed_cap < 1 {
            return Err(Error::Config("sync.trick_play_speed_cap must be at least 1".to_string()));
        }
        if self.live_low_level_percent > self.live_high_level_percent {
            return Err(Error::Config(format!(
                "sync.live_low_level_percent ({}) exceeds sync.live_high_level_percent ({})",
                self.live_low_level_percent, self.live_high_level_percent
            )));
        }
        Ok(())
    }
}

/// Command-line overrides applied on top of the loaded file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub audio_language: Option<String>,
    pub subtitle_language: Option<String>,
    pub subtitles_on: Option<bool>,
    pub video_only: bool,
}

impl PlayerConfig {
    /// Parse a configuration document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig = parse_toml(content)?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Load from `path` (defaults when absent), then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: PlayerConfig = load_toml_or_default(path)?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides (highest priority)
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(lang) = overrides.audio_language {
            info!("Audio language overridden from command line: {}", lang);
            self.selection.audio_language = lang;
        }
        if let Some(lang) = overrides.subtitle_language {
            info!("Subtitle language overridden from command line: {}", lang);
            self.selection.subtitle_language = lang;
        }
        if let Some(on) = overrides.subtitles_on {
            self.selection.subtitles_on = on;
        }
        if overrides.video_only {
            self.selection.video_only = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PlayerConfig::from_toml_str("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sync.forward_jump_ms, 1000);
        assert_eq!(config.sync.backward_jump_ms, 500);
        assert_eq!(config.sync.gate_abandon_ms, 20_000);
        assert_eq!(config.sync.resync_cooldown_ms, 3000);
        assert!(config.selection.subtitles_on);
        assert!(config.selection.prefer_default_flag);
    }

    #[test]
    fn test_partial_sync_section_keeps_other_defaults() {
        let config = PlayerConfig::from_toml_str(
            r#"
            [sync]
            resync_cooldown_ms = 1500

            [selection]
            audio_language = "original"
            subtitle_mode = "forced_only"
            channel_preference = "stereo"

            [selection.codec_priority]
            opus = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.resync_cooldown_ms, 1500);
        assert_eq!(config.sync.cache_runway_ms, 8000);
        assert!(config.selection.audio_original());
        assert_eq!(config.selection.subtitle_mode, SubtitleMode::ForcedOnly);
        assert_eq!(config.selection.channel_preference, ChannelPreference::Stereo);
        assert_eq!(config.selection.codec_priority.get("opus"), Some(&9));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = PlayerConfig::from_toml_str("[sync]\nforward_jump_ms = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let result = PlayerConfig::from_toml_str(
            "[sync]\nlive_low_level_percent = 20\nlive_high_level_percent = 10\n",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides_take_priority() {
        let mut config = PlayerConfig::from_toml_str("[selection]\naudio_language = \"eng\"\n").unwrap();
        config.apply_overrides(ConfigOverrides {
            log_level: Some("debug".to_string()),
            audio_language: Some("jpn".to_string()),
            subtitles_on: Some(false),
            ..Default::default()
        });
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.selection.audio_language, "jpn");
        assert!(!config.selection.subtitles_on);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlayerConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.sync.demuxer_open_attempts, 10);
    }
}
