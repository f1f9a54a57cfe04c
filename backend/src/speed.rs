use shared::{Track, TrackPoint, TrackSegment};

use crate::geo::haversine_m;

/// m/s to km/h.
pub const KMH_PER_MPS: f64 = 3.6;

/// Speed needed to get from `from` to `to`, in km/h.
///
/// Zero elapsed time gives 0.0. So does a missing timestamp on either
/// side, which validated tracks never have. Out-of-order timestamps use
/// the absolute interval.
pub fn instant_speed_kph(from: &TrackPoint, to: &TrackPoint) -> f64 {
    let (Some(t0), Some(t1)) = (from.time, to.time) else {
        return 0.0;
    };
    let elapsed = if t1 >= t0 { t1 - t0 } else { t0 - t1 };
    let seconds = elapsed.num_seconds() as f64 + f64::from(elapsed.subsec_nanos()) / 1e9;
    if seconds == 0.0 {
        return 0.0;
    }
    let meters = haversine_m(from.coordinate(), to.coordinate());
    meters / seconds * KMH_PER_MPS
}

/// Per-point speeds for one segment. The first point copies the second;
/// a lone point stays unset.
pub fn segment_speeds(points: &[TrackPoint]) -> Vec<Option<f64>> {
    let mut speeds: Vec<Option<f64>> = Vec::with_capacity(points.len());
    speeds.push(None);
    speeds.extend(
        points
            .windows(2)
            .map(|pair| Some(instant_speed_kph(&pair[0], &pair[1]))),
    );
    if points.len() >= 2 {
        speeds[0] = speeds[1];
    }
    speeds.truncate(points.len());
    speeds
}

fn enrich_segment(segment: TrackSegment) -> TrackSegment {
    let speeds = segment_speeds(&segment.track_points);
    let track_points = segment
        .track_points
        .into_iter()
        .zip(speeds)
        .map(|(point, speed_kph)| TrackPoint { speed_kph, ..point })
        .collect();
    TrackSegment { track_points }
}

/// `(average, max)` over every point of the track. Unset speeds count as
/// 0.0 but still count towards the average.
pub fn track_speed_summary(track: &Track) -> (f64, f64) {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut max: f64 = 0.0;
    for speed in track.points().map(|p| p.speed_kph.unwrap_or(0.0)) {
        count += 1;
        sum += speed;
        max = max.max(speed);
    }
    let average = if count == 0 { 0.0 } else { sum / count as f64 };
    (average, max)
}

/// Annotate every point with its speed and fill in the track aggregates.
pub fn enrich(track: Track) -> Track {
    let track_segments = track
        .track_segments
        .into_iter()
        .map(enrich_segment)
        .collect();
    let mut enriched = Track {
        track_segments,
        ..track
    };
    let (average, max) = track_speed_summary(&enriched);
    enriched.average_speed_kph = Some(average);
    enriched.track_max_speed_kph = Some(max);
    enriched
}
