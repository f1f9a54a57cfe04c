use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// A single recorded GPS fix.
///
/// `time` is `None` when the source document carried no usable timestamp;
/// such points never survive validation. `speed_kph` is filled in by the
/// enrichment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub speed_kph: Option<f64>,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64, time: Option<DateTime<Utc>>) -> Self {
        Self {
            lat,
            lon,
            time,
            speed_kph: None,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Contiguous recording span, points in recording order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub track_points: Vec<TrackPoint>,
}

impl TrackSegment {
    pub fn new(track_points: Vec<TrackPoint>) -> Self {
        Self { track_points }
    }

    pub fn len(&self) -> usize {
        self.track_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_points.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: Option<String>,
    pub desc: Option<String>,
    pub url: Option<String>,
    pub track_segments: Vec<TrackSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_speed_kph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_max_speed_kph: Option<f64>,
}

impl Track {
    pub fn points(&self) -> impl Iterator<Item = &TrackPoint> {
        self.track_segments
            .iter()
            .flat_map(|segment| segment.track_points.iter())
    }

    pub fn point_count(&self) -> usize {
        self.track_segments.iter().map(TrackSegment::len).sum()
    }

    pub fn is_enriched(&self) -> bool {
        self.average_speed_kph.is_some() && self.track_max_speed_kph.is_some()
    }
}

/// Body of `GET /`: where a map client should center itself initially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialCoordinates {
    pub initial_coordinates: Coordinate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_track() -> Track {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let points = (0..3)
            .map(|i| TrackPoint {
                speed_kph: Some(i as f64 * 1.5),
                ..TrackPoint::new(51.5 + i as f64 * 0.001, -0.12, Some(start))
            })
            .collect();
        Track {
            name: Some("Morning ride".into()),
            desc: None,
            url: Some("/user/someone/traces/1".into()),
            track_segments: vec![TrackSegment::new(points)],
            average_speed_kph: Some(1.5),
            track_max_speed_kph: Some(3.0),
        }
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let value = serde_json::to_value(sample_track()).unwrap();
        assert_eq!(value["name"], "Morning ride");
        assert!(value["desc"].is_null());
        assert_eq!(value["average_speed_kph"], 1.5);
        assert_eq!(value["track_max_speed_kph"], 3.0);

        let point = &value["track_segments"][0]["track_points"][1];
        assert_eq!(point["lon"], -0.12);
        assert_eq!(point["speed_kph"], 1.5);
        assert_eq!(point["time"], "2024-05-01T08:00:00Z");
    }

    #[test]
    fn json_round_trip_preserves_track() {
        let track = sample_track();
        let json = serde_json::to_string(&track).unwrap();
        let back: Track = serde_json::from_str(&json).unwrap();

        assert_eq!(back.name, track.name);
        assert_eq!(back.desc, track.desc);
        assert_eq!(back.url, track.url);
        assert_eq!(back.point_count(), track.point_count());
        for (a, b) in back.points().zip(track.points()) {
            let (a, b) = (a.speed_kph.unwrap(), b.speed_kph.unwrap());
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn unenriched_track_omits_aggregate_fields() {
        let track = Track::default();
        let value = serde_json::to_value(&track).unwrap();
        assert!(value.get("average_speed_kph").is_none());
        assert!(!track.is_enriched());
    }
}
