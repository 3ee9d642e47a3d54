//! Utility functions for geodesic calculations

use crate::Coordinate;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates in kilometers (haversine formula)
#[inline]
pub fn distance_km(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.latitude().to_radians();
    let lat2 = to.latitude().to_radians();
    let delta_lat = (to.latitude() - from.latitude()).to_radians();
    let delta_lon = (to.longitude() - from.longitude()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lon: f64, lat: f64) -> Coordinate {
        Coordinate::new(lon, lat).unwrap()
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let tokyo = coord(139.7528, 35.6852);
        assert!(distance_km(&tokyo, &tokyo).abs() < 1e-9);
    }

    #[test]
    fn test_tokyo_to_osaka() {
        let tokyo = coord(139.6917, 35.6895);
        let osaka = coord(135.5023, 34.6937);
        let d = distance_km(&tokyo, &osaka);
        // Roughly 400 km as the crow flies
        assert!(d > 390.0 && d < 410.0, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric() {
        let london = coord(-0.1278, 51.5074);
        let paris = coord(2.3522, 48.8566);
        let there = distance_km(&london, &paris);
        let back = distance_km(&paris, &london);
        assert!((there - back).abs() < 1e-9);
        assert!(there > 330.0 && there < 350.0, "got {there}");
    }

    #[test]
    fn test_antipodal_points() {
        let d = distance_km(&coord(0.0, 0.0), &coord(180.0, 0.0));
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;
        assert!((d - half_circumference).abs() < 1e-6);
    }
}
