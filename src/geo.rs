//! Proximity math for nearby-user matching.
//!
//! Pure functions, no state. Distances are great-circle meters on a
//! spherical Earth.

/// Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Default notification radius: 250 feet expressed in meters.
pub const DEFAULT_PROXIMITY_RADIUS_METERS: f64 = 76.2;

/// Haversine great-circle distance in meters between two WGS84 coordinates.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);

    // a can creep past 1.0 for near-antipodal inputs; keep asin in domain.
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Membership test for the notification radius.
pub fn within_radius(radius_meters: f64, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> bool {
    distance_meters(lat1, lon1, lat2, lon2) <= radius_meters
}

#[cfg(test)]
mod tests {
    use super::*;

    // One degree of latitude on the reference sphere, in meters.
    const METERS_PER_DEG_LAT: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

    #[test]
    fn coincident_points_have_zero_distance() {
        assert_eq!(distance_meters(37.7749, -122.4194, 37.7749, -122.4194), 0.0);
        assert_eq!(distance_meters(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(distance_meters(-89.9, 179.9, -89.9, 179.9), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let d1 = distance_meters(37.7749, -122.4194, 34.0522, -118.2437);
        let d2 = distance_meters(34.0522, -118.2437, 37.7749, -122.4194);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn san_francisco_to_los_angeles() {
        let d = distance_meters(37.7749, -122.4194, 34.0522, -118.2437);
        assert!((d - 559_100.0).abs() < 1_000.0, "got {}", d);
    }

    #[test]
    fn antipodal_points_stay_finite() {
        let d = distance_meters(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        assert!((d - EARTH_RADIUS_METERS * std::f64::consts::PI).abs() < 1.0);
    }

    #[test]
    fn radius_is_reflexive_and_symmetric() {
        let r = DEFAULT_PROXIMITY_RADIUS_METERS;
        assert!(within_radius(r, 37.7749, -122.4194, 37.7749, -122.4194));

        let off = 70.0 / METERS_PER_DEG_LAT;
        assert!(within_radius(r, 37.7749, -122.4194, 37.7749 + off, -122.4194));
        assert!(within_radius(r, 37.7749 + off, -122.4194, 37.7749, -122.4194));
    }

    #[test]
    fn radius_is_monotonic_in_distance() {
        let r = DEFAULT_PROXIMITY_RADIUS_METERS;
        let base = (37.7749, -122.4194);
        let mut last = 0.0;
        for meters in [10.0, 50.0, 76.0, 100.0, 200.0, 1_000.0] {
            let off = meters / METERS_PER_DEG_LAT;
            let d = distance_meters(base.0, base.1, base.0 + off, base.1);
            assert!(d > last);
            assert_eq!(within_radius(r, base.0, base.1, base.0 + off, base.1), d <= r);
            last = d;
        }
    }

    #[test]
    fn two_hundred_meters_is_outside_default_radius() {
        let off = 200.0 / METERS_PER_DEG_LAT;
        assert!(!within_radius(
            DEFAULT_PROXIMITY_RADIUS_METERS,
            37.7749,
            -122.4194,
            37.7749 + off,
            -122.4194
        ));
    }
}
