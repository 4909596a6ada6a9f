//! Application configuration
//!
//! Read from `<data_dir>/config.json` when present, then overridden by
//! `METER_CAPTURE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const ENV_DATA_DIR: &str = "METER_CAPTURE_DATA_DIR";
const ENV_ANALYSIS_DELAY_MS: &str = "METER_CAPTURE_ANALYSIS_DELAY_MS";
const ENV_CAMERA_TIMEOUT_MS: &str = "METER_CAPTURE_CAMERA_TIMEOUT_MS";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Where flags, readings and the profile document live
    pub data_dir: PathBuf,

    /// Stand-in analysis duration
    pub analysis_delay_ms: u64,

    /// Give up on camera acquisition after this long; unset waits forever
    pub camera_timeout_ms: Option<u64>,

    /// Use the virtual camera even when a native one is available
    pub virtual_camera: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".meter-capture"),
            analysis_delay_ms: 2000,
            camera_timeout_ms: None,
            virtual_camera: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment and the data directory
    pub fn load() -> Result<Self, ConfigError> {
        let data_dir = std::env::var(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default().data_dir);

        let mut config = Self::from_file(&data_dir.join("config.json"))?;
        config.data_dir = data_dir;
        config.apply_env(|key| std::env::var(key).ok())?;

        tracing::debug!("Loaded config: {:?}", config);
        Ok(config)
    }

    /// Read `path`, falling back to defaults if it does not exist
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Apply overrides looked up through `lookup`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_ANALYSIS_DELAY_MS) {
            self.analysis_delay_ms = parse_ms(ENV_ANALYSIS_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_CAMERA_TIMEOUT_MS) {
            self.camera_timeout_ms = match value.trim() {
                "" | "0" | "none" => None,
                v => Some(parse_ms(ENV_CAMERA_TIMEOUT_MS, v)?),
            };
        }
        Ok(())
    }

    pub fn analysis_delay(&self) -> Duration {
        Duration::from_millis(self.analysis_delay_ms)
    }

    pub fn camera_timeout(&self) -> Option<Duration> {
        self.camera_timeout_ms.map(Duration::from_millis)
    }

    pub fn flags_path(&self) -> PathBuf {
        self.data_dir.join("capture-flags.json")
    }

    pub fn readings_path(&self) -> PathBuf {
        self.data_dir.join("readings.json")
    }

    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("profile.json")
    }
}

fn parse_ms(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::from_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.analysis_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"cameraTimeoutMs": 15000}"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.camera_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.analysis_delay_ms, 2000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_ANALYSIS_DELAY_MS, "500"),
            (ENV_CAMERA_TIMEOUT_MS, "none"),
        ]);
        let mut config = AppConfig {
            camera_timeout_ms: Some(1000),
            ..Default::default()
        };

        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.analysis_delay_ms, 500);
        assert_eq!(config.camera_timeout_ms, None);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|key| (key == ENV_ANALYSIS_DELAY_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
