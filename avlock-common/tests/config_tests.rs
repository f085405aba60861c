//! Integration tests for configuration resolution and graceful degradation
//!
//! Tests that manipulate AVLOCK_CONFIG are marked with #[serial] so they never
//! race each other on the process environment.

use avlock_common::config::{
    load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR,
};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize, PartialEq)]
struct SampleConfig {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    name: String,
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/avlock-from-env.toml");
    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Some(PathBuf::from("/tmp/avlock-from-env.toml")));
}

#[test]
#[serial]
fn test_cli_argument_overrides_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/avlock-from-env.toml");
    let cli = PathBuf::from("/tmp/avlock-from-cli.toml");
    let path = resolve_config_path(Some(&cli), CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Some(cli));
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");
    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    // Falls through to the platform default, which only resolves if present
    if let Some(p) = path {
        assert!(p.exists());
    }
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let config: SampleConfig = load_toml_or_default(Some(&missing)).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_existing_file_is_parsed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name = \"lab\"\n[logging]\nlevel = \"trace\"").unwrap();

    let config: SampleConfig = load_toml_or_default(Some(file.path())).unwrap();
    assert_eq!(config.name, "lab");
    assert_eq!(config.logging.level, "trace");
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name = ").unwrap();

    let result: avlock_common::Result<SampleConfig> = load_toml_or_default(Some(file.path()));
    assert!(result.is_err());
}
