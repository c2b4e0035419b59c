use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted debounce window: one hour.
pub const MAX_DEBOUNCE_WINDOW_SECONDS: f64 = 3600.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Every tunable of the perception pipeline.
///
/// Serialized with camelCase keys (`targetFps`, `inferenceTimeoutMs`, ...).
/// Missing keys take their default, so a config file only needs the values
/// it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub target_fps: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub detection_confidence_threshold: f64,
    pub recognition_similarity_threshold: f64,
    pub tie_epsilon: f64,
    pub debounce_window_seconds: f64,
    pub inference_timeout_ms: u64,
    pub max_feedback_events_per_cycle: usize,
    pub source_stall_timeout_ms: u64,
    pub degraded_after_timeouts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 15,
            frame_width: 640,
            frame_height: 480,
            detection_confidence_threshold: 0.5,
            recognition_similarity_threshold: 0.75,
            tie_epsilon: 1e-3,
            debounce_window_seconds: 4.0,
            inference_timeout_ms: 200,
            max_feedback_events_per_cycle: 3,
            source_stall_timeout_ms: 1000,
            degraded_after_timeouts: 3,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/Narrator/config.json`, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Narrator").join("config.json"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_fps == 0 || self.target_fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "targetFps must be between 1 and 120, got {}",
                self.target_fps
            )));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame size must be non-zero, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if !(0.0..=1.0).contains(&self.detection_confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detectionConfidenceThreshold must be between 0.0 and 1.0, got {}",
                self.detection_confidence_threshold
            )));
        }
        if !(-1.0..=1.0).contains(&self.recognition_similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "recognitionSimilarityThreshold must be between -1.0 and 1.0, got {}",
                self.recognition_similarity_threshold
            )));
        }
        if !(0.0..0.1).contains(&self.tie_epsilon) {
            return Err(ConfigError::Invalid(format!(
                "tieEpsilon must be in [0.0, 0.1), got {}",
                self.tie_epsilon
            )));
        }
        if !(0.0..=MAX_DEBOUNCE_WINDOW_SECONDS).contains(&self.debounce_window_seconds) {
            return Err(ConfigError::Invalid(format!(
                "debounceWindowSeconds must be between 0 and {MAX_DEBOUNCE_WINDOW_SECONDS}, got {}",
                self.debounce_window_seconds
            )));
        }
        if self.inference_timeout_ms == 0 {
            return Err(ConfigError::Invalid("inferenceTimeoutMs must be positive".into()));
        }
        if self.max_feedback_events_per_cycle == 0 {
            return Err(ConfigError::Invalid(
                "maxFeedbackEventsPerCycle must be at least 1".into(),
            ));
        }
        if self.source_stall_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sourceStallTimeoutMs must be positive".into(),
            ));
        }
        if self.degraded_after_timeouts == 0 {
            return Err(ConfigError::Invalid(
                "degradedAfterTimeouts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        let seconds = self.debounce_window_seconds;
        if seconds.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(seconds.clamp(0.0, MAX_DEBOUNCE_WINDOW_SECONDS))
    }

    pub fn source_stall_timeout(&self) -> Duration {
        Duration::from_millis(self.source_stall_timeout_ms)
    }

    /// Oldest a frame may be when its results are announced.
    pub fn cycle_budget(&self) -> Duration {
        self.frame_interval() + self.inference_timeout()
    }
}
