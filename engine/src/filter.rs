use chrono::{DateTime, Utc};
use shared::{GeoPoint, PointSequence};

use crate::{cancel::CancellationToken, error::EngineError, geodesy};

/// Points whose timestamp lies within `[start, end]`. Untimed points are dropped.
pub fn by_time_range(
    points: &[GeoPoint],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<PointSequence, EngineError> {
    let mut kept = Vec::new();
    for point in points {
        cancel.check()?;
        if point.time.is_some_and(|t| start <= t && t <= end) {
            kept.push(*point);
        }
    }
    tracing::debug!("time range filter kept {}/{} points", kept.len(), points.len());
    Ok(kept)
}

/// Points whose speed from the preceding input point lies within `[min, max]` m/s.
///
/// The first point is always kept. A point whose speed cannot be computed
/// (missing timestamp or non-positive time delta) is kept as well.
pub fn by_speed_range(
    points: &[GeoPoint],
    min: f64,
    max: f64,
    cancel: &CancellationToken,
) -> Result<PointSequence, EngineError> {
    let Some(first) = points.first() else {
        return Ok(Vec::new());
    };
    let mut kept = vec![*first];
    for pair in points.windows(2) {
        cancel.check()?;
        let (prev, curr) = (&pair[0], &pair[1]);
        let keep = match prev.seconds_until(curr) {
            Some(dt) if dt > 0.0 => {
                let speed = geodesy::distance(prev, curr) / dt;
                (min..=max).contains(&speed)
            }
            _ => true,
        };
        if keep {
            kept.push(*curr);
        }
    }
    tracing::debug!("speed range filter kept {}/{} points", kept.len(), points.len());
    Ok(kept)
}

/// Drop interior points that look like GPS glitches.
///
/// An interior point is an outlier when the speed from its predecessor
/// exceeds `speed_threshold`, or when it jumps by more than
/// `elevation_threshold` from both neighbours. Endpoints are always kept and
/// sequences shorter than 3 points are returned as-is.
pub fn remove_outliers(
    points: &[GeoPoint],
    speed_threshold: f64,
    elevation_threshold: f64,
    cancel: &CancellationToken,
) -> Result<PointSequence, EngineError> {
    if points.len() < 3 {
        return Ok(points.to_vec());
    }

    let mut kept = Vec::with_capacity(points.len());
    kept.push(points[0]);
    for window in points.windows(3) {
        cancel.check()?;
        let (prev, curr, next) = (&window[0], &window[1], &window[2]);
        if !is_outlier(prev, curr, next, speed_threshold, elevation_threshold) {
            kept.push(*curr);
        }
    }
    kept.push(points[points.len() - 1]);

    tracing::debug!(
        "outlier filter removed {}/{} points",
        points.len() - kept.len(),
        points.len()
    );
    Ok(kept)
}

fn is_outlier(
    prev: &GeoPoint,
    curr: &GeoPoint,
    next: &GeoPoint,
    speed_threshold: f64,
    elevation_threshold: f64,
) -> bool {
    let too_fast = match prev.seconds_until(curr) {
        Some(dt) if dt > 0.0 => geodesy::distance(prev, curr) / dt > speed_threshold,
        _ => false,
    };
    let spike = match (prev.elevation, curr.elevation, next.elevation) {
        (Some(p), Some(c), Some(n)) => {
            (c - p).abs() > elevation_threshold && (n - c).abs() > elevation_threshold
        }
        _ => false,
    };
    too_fast || spike
}
