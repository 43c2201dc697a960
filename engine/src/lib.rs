pub mod cancel;
pub mod config;
pub mod error;
pub mod filter;
pub mod geodesy;
pub mod gpx_io;
pub mod simplify;
pub mod smoothing;
pub mod stats;

use shared::{AnalysisResult, FilterCriteria, GeoPoint, PointSequence};

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Configured entry point for analysis, filtering and simplification.
///
/// Holds no per-call state; every call works on the caller's sequences and
/// returns new values. Clone it to hand the same configuration and
/// cancellation token to a worker thread.
#[derive(Debug, Clone, Default)]
pub struct TrackEngine {
    config: EngineConfig,
    cancel: CancellationToken,
}

impl TrackEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        Self { cancel, ..self }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn analyze<S: AsRef<[GeoPoint]>>(
        &self,
        sequences: &[S],
    ) -> Result<AnalysisResult, EngineError> {
        stats::analyze(sequences, &self.config, &self.cancel)
    }

    pub fn analyze_summary<S: AsRef<[GeoPoint]>>(
        &self,
        sequences: &[S],
    ) -> Result<AnalysisResult, EngineError> {
        stats::analyze_summary(sequences, &self.config, &self.cancel)
    }

    pub fn apply(
        &self,
        points: &[GeoPoint],
        criteria: &FilterCriteria,
    ) -> Result<PointSequence, EngineError> {
        match *criteria {
            FilterCriteria::TimeRange { start, end } => {
                filter::by_time_range(points, start, end, &self.cancel)
            }
            FilterCriteria::SpeedRange { min, max } => {
                filter::by_speed_range(points, min, max, &self.cancel)
            }
            FilterCriteria::Outliers {
                speed_threshold,
                elevation_threshold,
            } => {
                filter::remove_outliers(points, speed_threshold, elevation_threshold, &self.cancel)
            }
            FilterCriteria::Simplify { tolerance } => {
                simplify::simplify(points, tolerance, &self.cancel)
            }
        }
    }

    /// Outlier criteria built from the configured thresholds.
    pub fn default_outlier_criteria(&self) -> FilterCriteria {
        FilterCriteria::Outliers {
            speed_threshold: self.config.outlier_speed_threshold_mps,
            elevation_threshold: self.config.outlier_elevation_threshold_m,
        }
    }

    /// Simplify with `tolerance`, or the configured default when `None`.
    pub fn simplify(
        &self,
        points: &[GeoPoint],
        tolerance: Option<f64>,
    ) -> Result<PointSequence, EngineError> {
        let tolerance = tolerance.unwrap_or(self.config.simplify_tolerance_m);
        simplify::simplify(points, tolerance, &self.cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn track() -> Vec<GeoPoint> {
        (0..6)
            .map(|i| {
                let t = Utc.timestamp_opt(1_700_000_000 + i * 10, 0).unwrap();
                GeoPoint::new(0.0, i as f64 * 0.001)
                    .with_elevation(100.0 + i as f64 * 5.0)
                    .with_time(t)
            })
            .collect()
    }

    #[test]
    fn test_apply_dispatches_each_criteria() {
        let engine = TrackEngine::default();
        let points = track();

        let start = points[1].time.unwrap();
        let end = points[3].time.unwrap();
        let in_window = engine
            .apply(&points, &FilterCriteria::TimeRange { start, end })
            .unwrap();
        assert_eq!(in_window.len(), 3);

        let slow = engine
            .apply(&points, &FilterCriteria::SpeedRange { min: 0.0, max: 5.0 })
            .unwrap();
        assert_eq!(slow, vec![points[0]]);

        let cleaned = engine.apply(&points, &engine.default_outlier_criteria()).unwrap();
        assert_eq!(cleaned, points);

        let simplified = engine
            .apply(&points, &FilterCriteria::Simplify { tolerance: 10.0 })
            .unwrap();
        assert_eq!(simplified, vec![points[0], points[5]]);
    }

    #[test]
    fn test_simplify_uses_configured_tolerance() {
        let engine = TrackEngine::new(EngineConfig {
            simplify_tolerance_m: 0.0,
            ..EngineConfig::default()
        });
        let zigzag: Vec<GeoPoint> = (0..5)
            .map(|i| GeoPoint::new(if i % 2 == 0 { 0.0 } else { 0.0001 }, i as f64 * 0.001))
            .collect();
        assert_eq!(engine.simplify(&zigzag, None).unwrap().len(), 5);
        assert_eq!(engine.simplify(&zigzag, Some(50.0)).unwrap().len(), 2);
    }

    #[test]
    fn test_cancellation_from_another_handle() {
        let engine = TrackEngine::default();
        let remote = engine.cancellation();
        remote.cancel();
        assert_eq!(engine.analyze(&[track()]), Err(EngineError::Cancelled));
    }

    #[test]
    fn test_with_cancellation_replaces_token() {
        let token = CancellationToken::new();
        let engine = TrackEngine::default().with_cancellation(token.clone());
        token.cancel();
        assert!(engine.cancellation().is_cancelled());
    }
}
