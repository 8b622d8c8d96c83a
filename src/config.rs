//! Engine configuration
//!
//! Loaded from JSON; every field has a default so partial files work.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Tunables for the transport, the renderer and the output device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames per offline render pull
    pub max_frame_budget: u32,
    /// Directory for the rendered file; the system temp dir when unset
    pub output_dir: Option<PathBuf>,
    pub output_file_name: String,
    /// Progress publishing period while playing
    pub progress_interval_ms: u64,
    /// Frames per live device period
    pub device_period_frames: u32,
    /// Clock multiplier of the simulated device
    pub device_speed: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frame_budget: 4096,
            output_dir: None,
            output_file_name: "audioProcessed.wav".to_string(),
            progress_interval_ms: 16,
            device_period_frames: 512,
            device_speed: 1.0,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(EngineError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.max_frame_budget == 0 {
            return invalid("max_frame_budget must be greater than zero");
        }
        if self.progress_interval_ms == 0 {
            return invalid("progress_interval_ms must be greater than zero");
        }
        if self.device_period_frames == 0 {
            return invalid("device_period_frames must be greater than zero");
        }
        if self.device_speed.is_nan() || self.device_speed <= 0.0 {
            return invalid("device_speed must be positive");
        }
        if self.output_file_name.trim().is_empty() {
            return invalid("output_file_name must not be empty");
        }
        Ok(())
    }

    /// Where a render is written
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(&self.output_file_name)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_frame_budget, 4096);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.output_path(),
            std::env::temp_dir().join("audioProcessed.wav")
        );
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repitch.json");
        fs::write(&path, r#"{ "max_frame_budget": 1024, "output_dir": "/tmp/out" }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_frame_budget, 1024);
        assert_eq!(config.progress_interval_ms, 16);
        assert_eq!(config.output_path(), PathBuf::from("/tmp/out/audioProcessed.wav"));
    }

    #[test]
    fn test_validation_errors() {
        let config = EngineConfig {
            max_frame_budget: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().error_code(), "INVALID_CONFIG");

        let config = EngineConfig {
            device_speed: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            output_file_name: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "progress_interval_ms": 0 }"#).unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(EngineError::InvalidConfig { .. })
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(EngineError::Json(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EngineConfig {
            output_dir: Some(PathBuf::from("renders")),
            device_speed: 8.0,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<EngineConfig>(&json).unwrap(), config);
    }
}
