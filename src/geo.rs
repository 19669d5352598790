//! Great-circle helpers shared by speed estimation and proximity checks.

use crate::types::GeoPoint;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

impl GeoPoint {
    /// Point reached by travelling `distance_m` along `bearing_deg` (clockwise from north)
    pub fn destination(&self, bearing_deg: f64, distance_m: f64) -> GeoPoint {
        let delta = distance_m / EARTH_RADIUS_M;
        let theta = bearing_deg.to_radians();
        let phi1 = self.lat.to_radians();
        let lambda1 = self.lon.to_radians();

        let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
        let lambda2 = lambda1
            + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

        // Normalise longitude to [-180, 180)
        let lon = ((lambda2.to_degrees() + 540.0) % 360.0) - 180.0;
        GeoPoint::new(phi2.to_degrees(), lon)
    }

    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(*self, *other)
    }
}

/// True when `position` lies within `radius_m` of `target` (inclusive)
pub fn is_near(position: GeoPoint, target: GeoPoint, radius_m: f64) -> bool {
    haversine_distance(position, target) <= radius_m
}
