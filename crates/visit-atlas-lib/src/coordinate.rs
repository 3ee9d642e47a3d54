//! Geographic coordinates in (longitude, latitude) order

use crate::{AtlasError, Result};
use std::fmt;
use std::str::FromStr;

/// Fallback location used whenever live geolocation is unavailable (Chiyoda, Tokyo)
pub const FALLBACK_COORDINATE: Coordinate = Coordinate::new_unchecked(139.7528, 35.6852);

/// First map center when no user location is known yet
pub const TERRITORIAL_DEFAULT: Coordinate = Coordinate::new_unchecked(139.0, 35.0);

/// A WGS84 position in degrees.
///
/// Longitude is always within [-180, 180] and latitude within [-90, 90].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    longitude: f64,
    latitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting values outside the valid range (and NaN)
    pub fn new(longitude: f64, latitude: f64) -> Result<Self> {
        if (-180.0..=180.0).contains(&longitude) && (-90.0..=90.0).contains(&latitude) {
            Ok(Self::new_unchecked(longitude, latitude))
        } else {
            Err(AtlasError::InvalidCoordinate {
                longitude,
                latitude,
            })
        }
    }

    const fn new_unchecked(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Linear interpolation towards `other`, `t` clamped to [0, 1]
    pub fn lerp(&self, other: &Coordinate, t: f64) -> Coordinate {
        let t = t.clamp(0.0, 1.0);
        Self::new_unchecked(
            self.longitude + (other.longitude - self.longitude) * t,
            self.latitude + (other.latitude - self.latitude) * t,
        )
    }
}

impl From<Coordinate> for geo::Point<f64> {
    fn from(coordinate: Coordinate) -> Self {
        geo::Point::new(coordinate.longitude, coordinate.latitude)
    }
}

impl TryFrom<geo::Point<f64>> for Coordinate {
    type Error = AtlasError;

    fn try_from(point: geo::Point<f64>) -> Result<Self> {
        Coordinate::new(point.x(), point.y())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.longitude, self.latitude)
    }
}

/// Parses `"lon,lat"`, as accepted on the command line
impl FromStr for Coordinate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (lon, lat) = s
            .split_once(',')
            .ok_or_else(|| format!("expected `lon,lat`, got `{s}`"))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|e| format!("invalid longitude `{lon}`: {e}"))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|e| format!("invalid latitude `{lat}`: {e}"))?;
        Coordinate::new(lon, lat).map_err(|e| e.to_string())
    }
}
