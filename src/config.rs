//! # Configuration Management Module
//!
//! Persistent settings for recording sessions, stored in platform-appropriate
//! locations. Handles loading, saving, and providing defaults.
//!
//! ## Settings
//! - `max_duration_secs`: Sessions stop on their own after this long
//! - `update_interval_ms`: Requested sensor sampling period
//! - `output_dir`: Where CSV files go (defaults to the documents directory)
//! - `liveness_timeout_secs`: Stop when the sensor goes quiet this long (off by default)
//! - `toggle_debounce_ms`: Ignore toggles that would restart right after an automatic stop
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/sensor-log/config.toml
//! - Linux: ~/.config/sensor-log/config.toml
//! - Windows: %APPDATA%\sensor-log\config.toml

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_duration_secs: u64,
    pub update_interval_ms: u64,
    pub output_dir: Option<PathBuf>,
    pub liveness_timeout_secs: Option<u64>,
    pub toggle_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_duration_secs: 10,
            update_interval_ms: 100,
            output_dir: None,
            liveness_timeout_secs: None,
            toggle_debounce_ms: 500,
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-log")
            .join("config.toml")
    }

    /// Load config from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(ConfigError::ParseFailed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }

    pub fn liveness_timeout(&self) -> Option<Duration> {
        self.liveness_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn toggle_debounce(&self) -> Duration {
        Duration::from_millis(self.toggle_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_duration(), Duration::from_secs(10));
        assert_eq!(config.update_interval(), Duration::from_millis(100));
        assert_eq!(config.output_dir, None);
        assert_eq!(config.liveness_timeout(), None);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            max_duration_secs: 30,
            liveness_timeout_secs: Some(5),
            ..Config::default()
        };

        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        assert!(toml_str.contains("max_duration_secs = 30"));
        assert!(toml_str.contains("liveness_timeout_secs = 5"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            max_duration_secs = 60
            output_dir = "/tmp/recordings"
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.max_duration_secs, 60);
        assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/recordings")));
        assert_eq!(config.update_interval_ms, 100);
        assert_eq!(config.toggle_debounce_ms, 500);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_zero_liveness_means_disabled() {
        let config = Config {
            liveness_timeout_secs: Some(0),
            ..Config::default()
        };
        assert_eq!(config.liveness_timeout(), None);
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_duration_secs = \"soon\"").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseFailed(_))));
    }
}
