//! Configuration file resolution and TOML loading
//!
//! Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/avlock/player.toml`)
//! 4. Built-in defaults (no file)
//!
//! A missing configuration file is not an error: a warning is logged and the
//! compiled defaults are used.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the player configuration file
pub const CONFIG_ENV_VAR: &str = "AVLOCK_CONFIG";

/// File name looked up in the platform config directory
pub const DEFAULT_CONFIG_FILE: &str = "player.toml";

/// Logging section shared by every avlock binary
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Tracing filter directive (e.g. "info", "avlock_player=debug")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; stdout when absent
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform default configuration path (may not exist)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("avlock").join(DEFAULT_CONFIG_FILE))
}

/// Resolve the configuration file to load, if any
///
/// The CLI argument and environment variable are returned even when the file
/// does not exist so the caller can report it; the platform default is only
/// returned when present on disk.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|p| p.exists())
}

/// Parse a TOML document into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
}

/// Load `T` from `path`, falling back to `T::default()` when no file is given
/// or the file does not exist
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        debug!("No configuration file, using built-in defaults");
        return Ok(T::default());
    };

    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!("Loading configuration from {}", path.display());
            parse_toml(&content)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Configuration file {} not found, using built-in defaults",
                path.display()
            );
            Ok(T::default())
        }
        Err(e) => Err(Error::Io(e)),
    }
}
