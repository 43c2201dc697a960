use shared::GeoPoint;

/// Centered moving average over the elevations of `points`.
///
/// Each output averages the sample with up to `radius` neighbours on either
/// side, clipped at the boundaries so edge samples average fewer values.
/// Missing elevations count as 0 rather than being skipped; downstream
/// statistics rely on that exact behaviour.
pub fn smooth_elevations(points: &[GeoPoint], radius: usize) -> Vec<f64> {
    let raw: Vec<f64> = points.iter().map(|p| p.elevation.unwrap_or(0.0)).collect();
    moving_average(&raw, radius)
}

pub fn moving_average(values: &[f64], radius: usize) -> Vec<f64> {
    let len = values.len();
    (0..len)
        .map(|idx| {
            let lo = idx.saturating_sub(radius);
            let hi = (idx + radius).min(len - 1);
            let window = &values[lo..=hi];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}
