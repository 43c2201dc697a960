//! Trip statistics over one or more point sequences.
//!
//! Sequences are folded one after another into a single [`AnalysisResult`].
//! Several of the aggregation rules below are order dependent and are kept
//! exactly as they are; see the notes marked "Intentional".

use shared::{AnalysisResult, GeoPoint, ProfilePoint};

use crate::{
    cancel::CancellationToken, config::EngineConfig, error::EngineError, geodesy,
    smoothing::smooth_elevations,
};

/// Weight offset of the running grade blend; keeps the first sequence from
/// dividing by zero.
const GRADE_BLEND_EPSILON_M: f64 = 0.1;

/// Analyse `sequences` and build the pooled elevation profile.
pub fn analyze<S: AsRef<[GeoPoint]>>(
    sequences: &[S],
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisResult, EngineError> {
    run(sequences, config, cancel, true)
}

/// Same as [`analyze`] without the elevation profile.
pub fn analyze_summary<S: AsRef<[GeoPoint]>>(
    sequences: &[S],
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisResult, EngineError> {
    run(sequences, config, cancel, false)
}

fn run<S: AsRef<[GeoPoint]>>(
    sequences: &[S],
    config: &EngineConfig,
    cancel: &CancellationToken,
    with_profile: bool,
) -> Result<AnalysisResult, EngineError> {
    let mut acc = Accumulator {
        config,
        cancel,
        result: AnalysisResult::default(),
    };
    for sequence in sequences {
        acc.fold_sequence(sequence.as_ref())?;
    }
    let mut result = acc.result;

    if with_profile
        && result.total_distance > 0.0
        && result.max_elevation > result.min_elevation
    {
        match build_profile(sequences, config, cancel) {
            Ok(profile) => result.elevation_profile = profile,
            Err(EngineError::InsufficientData { found }) => {
                tracing::debug!("skipping elevation profile: {found} elevation point(s)");
            }
            Err(err) => return Err(err),
        }
    }

    tracing::debug!(
        "analysed {} sequence(s): {:.1} m, ascent {:.1} m, descent {:.1} m, {} profile points",
        sequences.len(),
        result.total_distance,
        result.total_ascent,
        result.total_descent,
        result.elevation_profile.len()
    );
    Ok(result)
}

struct Accumulator<'a> {
    config: &'a EngineConfig,
    cancel: &'a CancellationToken,
    result: AnalysisResult,
}

impl Accumulator<'_> {
    fn fold_sequence(&mut self, points: &[GeoPoint]) -> Result<(), EngineError> {
        if points.len() < 2 {
            return Ok(());
        }

        let legs = self.leg_distances(points)?;
        let sequence_distance: f64 = legs.iter().sum();
        self.result.total_distance += sequence_distance;

        let timed = points.iter().all(|p| p.time.is_some());
        if timed {
            self.fold_time(points, &legs)?;
        }
        if points.iter().all(|p| p.elevation.is_some()) {
            self.fold_elevation(points, &legs, sequence_distance)?;
        }
        if timed && sequence_distance > 0.0 {
            self.fold_speed(points, &legs)?;
        }
        Ok(())
    }

    /// `legs[i]` is the distance from `points[i]` to `points[i + 1]`.
    fn leg_distances(&self, points: &[GeoPoint]) -> Result<Vec<f64>, EngineError> {
        let mut legs = Vec::with_capacity(points.len().saturating_sub(1));
        for pair in points.windows(2) {
            self.cancel.check()?;
            legs.push(geodesy::distance(&pair[0], &pair[1]));
        }
        Ok(legs)
    }

    fn fold_time(&mut self, points: &[GeoPoint], legs: &[f64]) -> Result<(), EngineError> {
        let mut times: Vec<_> = points.iter().filter_map(|p| p.time).collect();
        times.sort_unstable();
        if let (Some(first), Some(last)) = (times.first(), times.last()) {
            let span = (*last - *first).num_milliseconds() as f64 / 1000.0;
            // Longest single sequence, not the sum over sequences.
            self.result.total_time_secs = self.result.total_time_secs.max(span);
        }

        for (pair, leg) in points.windows(2).zip(legs) {
            self.cancel.check()?;
            let Some(dt) = pair[0].seconds_until(&pair[1]) else {
                continue;
            };
            if dt <= 0.0 {
                continue;
            }
            if leg / dt >= self.config.moving_speed_threshold_mps {
                self.result.moving_time_secs += dt;
            }
        }
        Ok(())
    }

    fn fold_elevation(
        &mut self,
        points: &[GeoPoint],
        legs: &[f64],
        sequence_distance: f64,
    ) -> Result<(), EngineError> {
        let smoothed = smooth_elevations(points, self.config.smoothing_radius);

        let mut weighted_grade = 0.0;
        let mut graded_distance = 0.0;
        for (i, leg) in legs.iter().enumerate() {
            self.cancel.check()?;
            let delta = smoothed[i + 1] - smoothed[i];
            if delta.abs() <= self.config.noise_threshold_m {
                continue;
            }
            if delta > 0.0 {
                self.result.total_ascent += delta;
            } else {
                self.result.total_descent += delta.abs();
            }

            // Grade is measured against the raw horizontal distance.
            if *leg > self.config.min_grade_distance_m {
                let grade = delta / leg * 100.0;
                if grade.abs() > self.result.max_grade.abs() {
                    self.result.max_grade = grade;
                }
                weighted_grade += grade * leg;
                graded_distance += leg;
            }
        }

        // Intentional: a sequence only moves the running average when it
        // covers more than half of the distance folded so far, and then
        // blends in with weight distance / (running total + 0.1). The first
        // long sequence therefore dominates the average.
        if graded_distance > 0.0 {
            let sequence_grade = weighted_grade / graded_distance;
            let running_total = self.result.total_distance;
            if sequence_distance > running_total / 2.0 {
                let weight = sequence_distance / (running_total + GRADE_BLEND_EPSILON_M);
                self.result.average_grade =
                    self.result.average_grade * (1.0 - weight) + sequence_grade * weight;
            }
        }

        // Intentional: a 0.0 minimum doubles as "unset", so a genuine 0 m
        // minimum is replaced by the next sample. The maximum is a plain
        // running max starting at 0.
        for &elevation in &smoothed {
            if self.result.min_elevation == 0.0 || elevation < self.result.min_elevation {
                self.result.min_elevation = elevation;
            }
            if elevation > self.result.max_elevation {
                self.result.max_elevation = elevation;
            }
        }
        Ok(())
    }

    fn fold_speed(&mut self, points: &[GeoPoint], legs: &[f64]) -> Result<(), EngineError> {
        for (pair, leg) in points.windows(2).zip(legs) {
            self.cancel.check()?;
            let Some(dt) = pair[0].seconds_until(&pair[1]) else {
                continue;
            };
            if dt <= 0.0 {
                continue;
            }
            let speed = leg / dt;
            if speed <= 0.0 || speed >= self.config.max_reasonable_speed_mps {
                continue;
            }
            self.result.max_speed = self.result.max_speed.max(speed);
        }

        if self.result.moving_time_secs > 0.0 {
            self.result.average_speed = self.result.total_distance / self.result.moving_time_secs;
        }
        Ok(())
    }
}

/// Elevation profile over every elevation-bearing point of every sequence,
/// pooled in document order and resampled to `config.profile_samples`
/// points evenly spaced by cumulative distance.
pub fn build_profile<S: AsRef<[GeoPoint]>>(
    sequences: &[S],
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ProfilePoint>, EngineError> {
    let pooled: Vec<GeoPoint> = sequences
        .iter()
        .flat_map(|s| s.as_ref().iter())
        .filter(|p| p.elevation.is_some())
        .copied()
        .collect();
    if pooled.len() < 2 {
        return Err(EngineError::InsufficientData {
            found: pooled.len(),
        });
    }

    let smoothed = smooth_elevations(&pooled, config.smoothing_radius);
    let mut cumulative = Vec::with_capacity(pooled.len());
    let mut travelled = 0.0;
    cumulative.push(travelled);
    for pair in pooled.windows(2) {
        cancel.check()?;
        travelled += geodesy::distance(&pair[0], &pair[1]);
        cumulative.push(travelled);
    }

    let first = pooled[0].elevation.unwrap_or_default();
    let last = pooled[pooled.len() - 1].elevation.unwrap_or_default();
    resample_profile(
        &cumulative,
        &smoothed,
        (first, last),
        config.profile_samples,
        cancel,
    )
}

fn resample_profile(
    cumulative: &[f64],
    elevations: &[f64],
    (first, last): (f64, f64),
    samples: usize,
    cancel: &CancellationToken,
) -> Result<Vec<ProfilePoint>, EngineError> {
    let total = cumulative.last().copied().unwrap_or_default();
    let interval = total / (samples.max(2) - 1) as f64;
    let half = interval / 2.0;

    let mut profile = Vec::with_capacity(samples);
    for i in 0..samples {
        cancel.check()?;
        let point = if i == 0 {
            ProfilePoint {
                distance: 0.0,
                elevation: first,
                grade: 0.0,
            }
        } else if i == samples - 1 {
            ProfilePoint {
                distance: total,
                elevation: last,
                grade: 0.0,
            }
        } else {
            let distance = i as f64 * interval;
            let behind = (distance - half).max(0.0);
            let ahead = (distance + half).min(total);
            let span = ahead - behind;
            let grade = if span > 0.0 {
                (interpolate(cumulative, elevations, ahead)
                    - interpolate(cumulative, elevations, behind))
                    / span
                    * 100.0
            } else {
                0.0
            };
            ProfilePoint {
                distance,
                elevation: interpolate(cumulative, elevations, distance),
                grade,
            }
        };
        profile.push(point);
    }
    Ok(profile)
}

/// Linear interpolation of `values` at `distance` along `cumulative`.
fn interpolate(cumulative: &[f64], values: &[f64], distance: f64) -> f64 {
    let upper = cumulative.partition_point(|&c| c < distance);
    if upper == 0 {
        return values[0];
    }
    if upper >= cumulative.len() {
        return values[values.len() - 1];
    }
    let lower = upper - 1;
    let span = cumulative[upper] - cumulative[lower];
    if span <= 0.0 {
        return values[upper];
    }
    let t = (distance - cumulative[lower]) / span;
    values[lower] + t * (values[upper] - values[lower])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    /// Longitude step of roughly 111 m on the equator.
    const STEP: f64 = 0.001;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn point(i: usize, elevation: Option<f64>, secs: Option<i64>) -> GeoPoint {
        GeoPoint {
            elevation,
            time: secs.map(at),
            ..GeoPoint::new(0.0, i as f64 * STEP)
        }
    }

    fn climb(elevations: &[f64]) -> Vec<GeoPoint> {
        elevations
            .iter()
            .enumerate()
            .map(|(i, e)| point(i, Some(*e), Some(i as i64 * 10)))
            .collect()
    }

    fn run_default(sequences: &[Vec<GeoPoint>]) -> AnalysisResult {
        analyze(sequences, &EngineConfig::default(), &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_empty_input() {
        let result = run_default(&[]);
        assert_eq!(result, AnalysisResult::default());
    }

    #[test]
    fn test_short_sequences_are_skipped() {
        let result = run_default(&[vec![point(0, Some(100.0), Some(0))], vec![]]);
        assert_eq!(result.total_distance, 0.0);
        assert_eq!(result.min_elevation, 0.0);
        assert!(result.elevation_profile.is_empty());
    }

    #[test]
    fn test_spike_scenario() {
        let seq = vec![
            point(0, Some(0.0), Some(0)),
            point(1, Some(50.0), Some(10)),
            point(2, Some(0.0), Some(20)),
        ];
        let result = run_default(&[seq.clone()]);

        let expected_distance = geodesy::path_length(&seq);
        assert!((result.total_distance - expected_distance).abs() < 1e-9);
        assert!(result.total_ascent > 0.0);
        assert!(result.total_descent > 0.0);
        assert!((result.total_ascent - 25.0 / 3.0).abs() < 1e-9);
        assert!((result.total_descent - 25.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.total_time_secs, 20.0);
        assert_eq!(result.moving_time_secs, 20.0);
        assert!((result.average_speed - expected_distance / 20.0).abs() < 1e-9);
        assert!(result.max_speed > 11.0 && result.max_speed < 11.2);
        assert!((result.min_elevation - 50.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.max_elevation, 25.0);
        // the descent comes first and an equal climb does not replace it
        assert!(result.max_grade < 0.0);
        assert!(result.average_grade.abs() < 1e-9);
        assert_eq!(result.elevation_profile.len(), 100);
    }

    #[test]
    fn test_small_steps_below_noise_threshold() {
        let result = run_default(&[climb(&[100.0, 101.0, 100.5, 101.5, 100.0])]);
        assert_eq!(result.total_ascent, 0.0);
        assert_eq!(result.total_descent, 0.0);
        assert_eq!(result.max_grade, 0.0);
    }

    #[test]
    fn test_uniform_climb_grade() {
        let seq = climb(&[0.0, 10.0, 20.0, 30.0, 40.0]);
        let result = run_default(&[seq.clone()]);

        // smoothed: 5, 10, 20, 30, 35
        assert!((result.total_ascent - 30.0).abs() < 1e-9);
        let legs: Vec<f64> = seq.windows(2).map(|w| geodesy::distance(&w[0], &w[1])).collect();
        let total: f64 = legs.iter().sum();
        assert!((result.max_grade - 10.0 / legs[1] * 100.0).abs() < 1e-9);

        let sequence_grade = 30.0 / total * 100.0;
        let weight = total / (total + 0.1);
        assert!((result.average_grade - sequence_grade * weight).abs() < 1e-9);
    }

    #[test]
    fn test_short_later_sequence_does_not_move_average_grade() {
        let long = climb(&[0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        let short = climb(&[0.0, 40.0, 80.0]);
        let alone = run_default(&[long.clone()]);
        let both = run_default(&[long, short]);
        assert_eq!(both.average_grade, alone.average_grade);
        assert!(both.total_ascent > alone.total_ascent);
    }

    #[test]
    fn test_long_later_sequence_blends_average_grade() {
        let short = climb(&[0.0, 10.0, 20.0]);
        let long: Vec<GeoPoint> = climb(&[100.0, 80.0, 60.0, 40.0, 20.0, 0.0, -20.0, -40.0]);
        let config = EngineConfig::default();
        let token = CancellationToken::new();

        let first = analyze_summary(&[short.clone()], &config, &token).unwrap();
        let both = analyze_summary(&[short, long.clone()], &config, &token).unwrap();
        let long_alone = analyze_summary(&[long.clone()], &config, &token).unwrap();

        let running_total = both.total_distance;
        let long_distance = geodesy::path_length(&long);
        let weight = long_distance / (running_total + 0.1);
        let long_grade = long_alone.average_grade * (long_distance + 0.1) / long_distance;
        let expected = first.average_grade * (1.0 - weight) + long_grade * weight;
        assert!((both.average_grade - expected).abs() < 1e-9);
        assert!(both.average_grade < 0.0);
    }

    #[test]
    fn test_total_time_is_longest_span_and_moving_time_sums() {
        let a: Vec<GeoPoint> = (0..3).map(|i| point(i, None, Some(i as i64 * 50))).collect();
        let b: Vec<GeoPoint> = (0..3).map(|i| point(i, None, Some(i as i64 * 25))).collect();
        let result = run_default(&[a, b]);
        assert_eq!(result.total_time_secs, 100.0);
        assert_eq!(result.moving_time_secs, 150.0);
        assert!((result.average_speed - result.total_distance / 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_order_timestamps() {
        let seq = vec![
            point(0, None, Some(10)),
            point(1, None, Some(0)),
            point(2, None, Some(20)),
        ];
        let result = run_default(&[seq]);
        assert_eq!(result.total_time_secs, 20.0);
        // only the positive 20 s delta counts
        assert_eq!(result.moving_time_secs, 20.0);
    }

    #[test]
    fn test_stationary_time_is_not_moving() {
        let seq = vec![
            point(0, None, Some(0)),
            point(1, None, Some(10)),
            point(1, None, Some(600)),
            point(2, None, Some(610)),
        ];
        let result = run_default(&[seq]);
        assert_eq!(result.total_time_secs, 610.0);
        assert_eq!(result.moving_time_secs, 20.0);
    }

    #[test]
    fn test_unreasonable_speed_is_ignored() {
        let seq = vec![
            GeoPoint::new(0.0, 0.0).with_time(at(0)),
            GeoPoint::new(0.0, 1.0).with_time(at(1)),
        ];
        let result = run_default(&[seq]);
        assert_eq!(result.max_speed, 0.0);
        assert_eq!(result.moving_time_secs, 1.0);
        assert!(result.average_speed > 100.0);
    }

    #[test]
    fn test_partial_timestamps_skip_time_metrics() {
        let seq = vec![point(0, None, Some(0)), point(1, None, None)];
        let result = run_default(&[seq]);
        assert!(result.total_distance > 0.0);
        assert_eq!(result.total_time_secs, 0.0);
        assert_eq!(result.max_speed, 0.0);
    }

    #[test]
    fn test_partial_elevation_skips_elevation_metrics() {
        let seq = vec![
            point(0, Some(0.0), None),
            point(1, None, None),
            point(2, Some(90.0), None),
        ];
        let result = run_default(&[seq]);
        assert_eq!(result.total_ascent, 0.0);
        assert_eq!(result.max_elevation, 0.0);
        assert!(result.elevation_profile.is_empty());
    }

    #[test]
    fn test_zero_minimum_acts_as_unset() {
        let sea_level = climb(&[0.0, 0.0, 0.0]);
        let hill = climb(&[100.0, 100.0, 100.0]);
        let result = run_default(&[sea_level, hill]);
        assert_eq!(result.min_elevation, 100.0);
        assert_eq!(result.max_elevation, 100.0);
        // flat max == min, so no profile
        assert!(result.elevation_profile.is_empty());
    }

    #[test]
    fn test_below_sea_level_keeps_zero_maximum() {
        // smoothed: -30, -110/3, -100/3, -45
        let result = run_default(&[climb(&[-50.0, -10.0, -50.0, -40.0])]);
        assert_eq!(result.min_elevation, -45.0);
        assert_eq!(result.max_elevation, 0.0);
        assert_eq!(result.elevation_profile.len(), 100);
    }

    #[test]
    fn test_summary_skips_profile() {
        let result = analyze_summary(
            &[climb(&[0.0, 50.0, 100.0])],
            &EngineConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(result.total_ascent > 0.0);
        assert!(result.elevation_profile.is_empty());
    }

    #[test]
    fn test_cancelled_analysis_returns_error() {
        let token = CancellationToken::new();
        token.cancel();
        let err = analyze(&[climb(&[0.0, 10.0])], &EngineConfig::default(), &token).unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }

    #[test]
    fn test_profile_two_points() {
        let end_lon = 1000.0 / 111_319.490_793;
        let seq = vec![
            GeoPoint::new(0.0, 0.0).with_elevation(0.0),
            GeoPoint::new(0.0, end_lon).with_elevation(100.0),
        ];
        let profile =
            build_profile(&[seq.clone()], &EngineConfig::default(), &CancellationToken::new())
                .unwrap();

        assert_eq!(profile.len(), 100);
        assert_eq!(profile[0].distance, 0.0);
        assert_eq!(profile[0].elevation, 0.0);
        let last = profile[99];
        assert!((last.distance - 1000.0).abs() < 0.5, "got {}", last.distance);
        assert_eq!(last.distance, geodesy::path_length(&seq));
        assert_eq!(last.elevation, 100.0);
        for pair in profile.windows(2) {
            assert!(pair[1].distance > pair[0].distance);
            assert!(pair[1].elevation >= pair[0].elevation);
        }
    }

    #[test]
    fn test_profile_pools_sequences_in_order() {
        let a = vec![point(0, Some(0.0), None), point(1, Some(30.0), None)];
        let b = vec![point(2, Some(60.0), None), point(3, None, None), point(3, Some(90.0), None)];
        let config = EngineConfig {
            smoothing_radius: 0,
            profile_samples: 4,
            ..EngineConfig::default()
        };
        let profile = build_profile(&[a, b], &config, &CancellationToken::new()).unwrap();
        assert_eq!(profile.len(), 4);
        assert_eq!(profile[0].elevation, 0.0);
        assert_eq!(profile[3].elevation, 90.0);
        assert!((profile[1].elevation - 30.0).abs() < 1e-6);
        assert!((profile[2].elevation - 60.0).abs() < 1e-6);
        assert!(profile[1].grade > 0.0);
    }

    #[test]
    fn test_profile_needs_two_elevation_points() {
        let seq = vec![point(0, Some(10.0), None), point(1, None, None)];
        let err = build_profile(&[seq], &EngineConfig::default(), &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err, EngineError::InsufficientData { found: 1 });
    }

    #[test]
    fn test_interpolate_clamps_and_handles_zero_span() {
        let cumulative = [0.0, 10.0, 10.0, 20.0];
        let values = [0.0, 10.0, 50.0, 60.0];
        assert_eq!(interpolate(&cumulative, &values, -5.0), 0.0);
        assert_eq!(interpolate(&cumulative, &values, 5.0), 5.0);
        assert_eq!(interpolate(&cumulative, &values, 15.0), 55.0);
        assert_eq!(interpolate(&cumulative, &values, 25.0), 60.0);
    }
}
