use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single track, route or waypoint sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            elevation: None,
            time: None,
        }
    }

    pub fn with_elevation(self, elevation: f64) -> Self {
        Self {
            elevation: Some(elevation),
            ..self
        }
    }

    pub fn with_time(self, time: DateTime<Utc>) -> Self {
        Self {
            time: Some(time),
            ..self
        }
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Seconds elapsed from `self` to `other`, if both carry a timestamp.
    pub fn seconds_until(&self, other: &Self) -> Option<f64> {
        let (from, to) = (self.time?, other.time?);
        Some((to - from).num_milliseconds() as f64 / 1000.0)
    }
}

/// Ordered points of one track segment or route. Point order is traversal order.
pub type PointSequence = Vec<GeoPoint>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfilePoint {
    pub distance: f64,
    pub elevation: f64,
    pub grade: f64,
}

/// Aggregate statistics over every sequence of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub total_distance: f64,
    pub total_time_secs: f64,
    pub moving_time_secs: f64,
    pub average_speed: f64,
    pub max_speed: f64,
    pub total_ascent: f64,
    pub total_descent: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub average_grade: f64,
    pub max_grade: f64,
    #[serde(default)]
    pub elevation_profile: Vec<ProfilePoint>,
}

impl AnalysisResult {
    pub fn total_time(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.total_time_secs.max(0.0))
    }

    pub fn moving_time(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.moving_time_secs.max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterCriteria {
    TimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    SpeedRange {
        min: f64,
        max: f64,
    },
    Outliers {
        speed_threshold: f64,
        elevation_threshold: f64,
    },
    Simplify {
        tolerance: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_point_validity() {
        assert!(GeoPoint::new(45.0, 5.0).is_valid());
        assert!(GeoPoint::new(-90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.1).is_valid());
    }

    #[test]
    fn test_seconds_until() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let a = GeoPoint::new(0.0, 0.0).with_time(t0);
        let b = GeoPoint::new(0.0, 0.0).with_time(t0 + chrono::Duration::seconds(90));
        assert_eq!(a.seconds_until(&b), Some(90.0));
        assert_eq!(b.seconds_until(&a), Some(-90.0));
        assert_eq!(a.seconds_until(&GeoPoint::new(0.0, 0.0)), None);
    }

    #[test]
    fn test_filter_criteria_json_shape() {
        let criteria = FilterCriteria::Simplify { tolerance: 10.0 };
        let json = serde_json::to_value(criteria).unwrap();
        assert_eq!(json["kind"], "simplify");
        assert_eq!(json["tolerance"], 10.0);
    }

    #[test]
    fn test_point_without_optional_fields_serializes_compactly() {
        let json = serde_json::to_string(&GeoPoint::new(1.5, 2.5)).unwrap();
        assert_eq!(json, r#"{"lat":1.5,"lon":2.5}"#);
        let back: GeoPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.elevation, None);
    }
}
