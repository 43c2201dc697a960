use std::{fs::File, io::Read, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config field `{field}` must be a finite, non-negative number")]
    InvalidThreshold { field: &'static str },
    #[error("profile_samples must be at least 2, got {0}")]
    TooFewProfileSamples(usize),
}

/// Tunable thresholds of the engine. Every field falls back to its default
/// when missing from the JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Smoothed elevation steps at or below this are treated as altimeter noise.
    pub noise_threshold_m: f64,
    /// Segments slower than this do not count as moving time.
    pub moving_speed_threshold_mps: f64,
    /// Segment speeds at or above this are GPS errors and ignored for max speed.
    pub max_reasonable_speed_mps: f64,
    /// Horizontal distance a step must exceed before its grade is considered.
    pub min_grade_distance_m: f64,
    /// Neighbours on each side used by the moving-average filter.
    pub smoothing_radius: usize,
    pub profile_samples: usize,
    pub simplify_tolerance_m: f64,
    pub outlier_speed_threshold_mps: f64,
    pub outlier_elevation_threshold_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            noise_threshold_m: 2.0,
            moving_speed_threshold_mps: 0.5,
            max_reasonable_speed_mps: 100.0,
            min_grade_distance_m: 1.0,
            smoothing_radius: 1,
            profile_samples: 100,
            simplify_tolerance_m: 10.0,
            outlier_speed_threshold_mps: 35.0,
            outlier_elevation_threshold_m: 100.0,
        }
    }
}

impl EngineConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("noise_threshold_m", self.noise_threshold_m),
            ("moving_speed_threshold_mps", self.moving_speed_threshold_mps),
            ("max_reasonable_speed_mps", self.max_reasonable_speed_mps),
            ("min_grade_distance_m", self.min_grade_distance_m),
            ("simplify_tolerance_m", self.simplify_tolerance_m),
            ("outlier_speed_threshold_mps", self.outlier_speed_threshold_mps),
            (
                "outlier_elevation_threshold_m",
                self.outlier_elevation_threshold_m,
            ),
        ];
        for (field, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { field });
            }
        }
        if self.profile_samples < 2 {
            return Err(ConfigError::TooFewProfileSamples(self.profile_samples));
        }
        Ok(())
    }
}
