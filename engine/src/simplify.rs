//! Ramer-Douglas-Peucker polyline simplification with a tolerance in meters.

use shared::{GeoPoint, PointSequence};

use crate::{cancel::CancellationToken, error::EngineError, geodesy};

/// Simplify `points`, keeping every point farther than `tolerance` meters from
/// the chord of its enclosing subrange. Endpoints are always kept and
/// sequences of 2 points or fewer are returned unchanged.
pub fn simplify(
    points: &[GeoPoint],
    tolerance: f64,
    cancel: &CancellationToken,
) -> Result<PointSequence, EngineError> {
    let keep = keep_mask(points, tolerance, cancel)?;
    let simplified: PointSequence = points
        .iter()
        .zip(&keep)
        .filter(|&(_, k)| *k)
        .map(|(p, _)| *p)
        .collect();
    tracing::debug!(
        "simplified {} points to {} (tolerance {tolerance} m)",
        points.len(),
        simplified.len()
    );
    Ok(simplified)
}

/// Mask of the points that survive simplification.
///
/// Subranges are processed from an explicit stack so very long tracks do not
/// exhaust the call stack.
pub fn keep_mask(
    points: &[GeoPoint],
    tolerance: f64,
    cancel: &CancellationToken,
) -> Result<Vec<bool>, EngineError> {
    if points.len() <= 2 {
        return Ok(vec![true; points.len()]);
    }

    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    let mut pending = vec![(0, last)];
    while let Some((start, end)) = pending.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_distance = 0.0;
        let mut farthest = start;
        for (i, point) in points.iter().enumerate().take(end).skip(start + 1) {
            cancel.check()?;
            let distance = perpendicular_distance(point, &points[start], &points[end]);
            // strict: the first of equally distant points wins
            if distance > max_distance {
                max_distance = distance;
                farthest = i;
            }
        }

        if max_distance > tolerance {
            keep[farthest] = true;
            pending.push((farthest, end));
            pending.push((start, farthest));
        }
    }
    Ok(keep)
}

/// Distance in meters from `point` to the chord `start`-`end`.
///
/// The projection treats (lon, lat) as planar coordinates; the gap between the
/// point and its projection is then measured with the haversine formula.
/// Existing tolerances were tuned against this mixed metric, so keep it.
fn perpendicular_distance(point: &GeoPoint, start: &GeoPoint, end: &GeoPoint) -> f64 {
    let dx = end.lon - start.lon;
    let dy = end.lat - start.lat;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return geodesy::distance(point, start);
    }

    let t = (((point.lon - start.lon) * dx + (point.lat - start.lat) * dy) / length_sq)
        .clamp(0.0, 1.0);
    let closest_lon = start.lon + t * dx;
    let closest_lat = start.lat + t * dy;
    geodesy::haversine(point.lat, point.lon, closest_lat, closest_lon)
}
