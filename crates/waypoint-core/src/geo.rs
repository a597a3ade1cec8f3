//! Great-circle distance.

use crate::location::Coordinate;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates, in meters.
pub fn haversine_distance_m(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        let p = Coordinate::new(10.0, 10.0);
        assert_eq!(haversine_distance_m(p, p), 0.0);
    }

    #[test]
    fn small_longitude_step() {
        // 0.0001 deg of longitude at 10N is roughly 11 m.
        let d = haversine_distance_m(Coordinate::new(10.0, 10.0), Coordinate::new(10.0, 10.0001));
        assert!((d - 10.95).abs() < 0.5, "got {d}");
    }

    #[test]
    fn hundredth_of_latitude() {
        // 0.01 deg of latitude is roughly 1.11 km.
        let d = haversine_distance_m(Coordinate::new(10.0, 10.0), Coordinate::new(10.01, 10.0));
        assert!((d - 1111.95).abs() < 1.0, "got {d}");
    }

    #[test]
    fn symmetric() {
        let a = Coordinate::new(48.8566, 2.3522);
        let b = Coordinate::new(51.5074, -0.1278);
        let ab = haversine_distance_m(a, b);
        let ba = haversine_distance_m(b, a);
        assert!((ab - ba).abs() < 1e-6);
        // Paris to London is about 344 km.
        assert!((ab - 343_556.0).abs() < 1_000.0, "got {ab}");
    }

    #[test]
    fn antipodal_points_are_half_circumference() {
        let d = haversine_distance_m(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }
}
