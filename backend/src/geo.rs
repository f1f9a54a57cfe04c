use std::fmt;

use geo_types::{coord, Polygon, Rect};
use serde::{Deserialize, Serialize};
use shared::Coordinate;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default query area, a slice of London.
pub const SAMPLE_BBOX: BoundingBox = BoundingBox {
    min_lon: 0.0,
    min_lat: 51.5,
    max_lon: 0.25,
    max_lat: 51.75,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GeoError {
    #[error("bounding box contains a non-finite coordinate")]
    NotFinite,
    #[error("min_{axis} ({min}) is greater than max_{axis} ({max})")]
    Inverted {
        axis: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{axis} {value} is out of range")]
    OutOfRange { axis: &'static str, value: f64 },
    #[error("bounding box needs all of min_lat, min_long, max_lat and max_long")]
    Incomplete,
}

/// Axis-aligned lat/lon rectangle used to scope a trace query.
///
/// Construction does not validate; call [`BoundingBox::validate`] on
/// anything that came from a user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn validate(&self) -> Result<(), GeoError> {
        let values = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GeoError::NotFinite);
        }
        for (axis, value, limit) in [
            ("lon", self.min_lon, 180.0),
            ("lon", self.max_lon, 180.0),
            ("lat", self.min_lat, 90.0),
            ("lat", self.max_lat, 90.0),
        ] {
            if value.abs() > limit {
                return Err(GeoError::OutOfRange { axis, value });
            }
        }
        if self.min_lon > self.max_lon {
            return Err(GeoError::Inverted {
                axis: "lon",
                min: self.min_lon,
                max: self.max_lon,
            });
        }
        if self.min_lat > self.max_lat {
            return Err(GeoError::Inverted {
                axis: "lat",
                min: self.min_lat,
                max: self.max_lat,
            });
        }
        Ok(())
    }

    pub fn center(&self) -> Coordinate {
        let (lat, lon) = center_of(self.min_lon, self.min_lat, self.max_lon, self.max_lat);
        Coordinate { lat, lon }
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lon >= self.min_lon
            && coord.lon <= self.max_lon
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Corner-by-corner comparison with a tolerance in degrees.
    pub fn approx_eq(&self, other: &BoundingBox, epsilon: f64) -> bool {
        self.corners()
            .iter()
            .zip(other.corners().iter())
            .all(|(a, b)| (a.lon - b.lon).abs() < epsilon && (a.lat - b.lat).abs() < epsilon)
    }

    /// SW, SE, NE, NW.
    pub fn corners(&self) -> [Coordinate; 4] {
        [
            Coordinate {
                lat: self.min_lat,
                lon: self.min_lon,
            },
            Coordinate {
                lat: self.min_lat,
                lon: self.max_lon,
            },
            Coordinate {
                lat: self.max_lat,
                lon: self.max_lon,
            },
            Coordinate {
                lat: self.max_lat,
                lon: self.min_lon,
            },
        ]
    }

    /// Closed counter-clockwise ring, x = lon and y = lat.
    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            coord! { x: self.min_lon, y: self.min_lat },
            coord! { x: self.max_lon, y: self.max_lat },
        )
        .to_polygon()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Midpoint of the box as `(lat, lon)`.
pub fn center_of(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> (f64, f64) {
    ((min_lat + max_lat) / 2.0, (min_lon + max_lon) / 2.0)
}

/// Great-circle distance in metres.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
