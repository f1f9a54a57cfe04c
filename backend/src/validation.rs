use shared::{Track, TrackSegment};

/// Fewest points a segment may have and still be used for speed analysis.
pub const MIN_POINTS_PER_SEGMENT: usize = 10;

/// A track is usable only if it has at least one segment and every segment
/// has enough points, all of them timestamped. One bad segment rejects the
/// whole track.
pub fn is_valid(track: &Track) -> bool {
    !track.track_segments.is_empty() && track.track_segments.iter().all(is_valid_segment)
}

pub fn is_valid_segment(segment: &TrackSegment) -> bool {
    segment.len() >= MIN_POINTS_PER_SEGMENT
        && segment.track_points.iter().all(|point| point.time.is_some())
}

/// Keep the usable tracks, in their original order.
pub fn validate(tracks: Vec<Track>) -> Vec<Track> {
    let total = tracks.len();
    let valid: Vec<Track> = tracks.into_iter().filter(is_valid).collect();
    if valid.len() < total {
        tracing::debug!("dropped {} of {} tracks as unusable", total - valid.len(), total);
    }
    valid
}
