//! Geographic utilities: great-circle distance and meter/degree conversion.

use crate::GpsPoint;

/// Earth radius used for all distance computations (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude on the sphere of radius [`EARTH_RADIUS_M`].
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Haversine great-circle distance in meters between two coordinates.
///
/// Callers must not pass the no-fix sentinel through this function.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Haversine distance in meters between two GPS points.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    distance(p1.latitude, p1.longitude, p2.latitude, p2.longitude)
}

/// Convert a distance in meters to (latitude, longitude) degree spans at a
/// reference latitude.
///
/// The longitude span grows toward the poles and saturates at 360 degrees.
pub fn meters_to_degrees(meters: f64, ref_lat: f64) -> (f64, f64) {
    let lat_deg = meters / METERS_PER_DEGREE;
    let cos_lat = ref_lat.to_radians().cos().abs();
    let lng_deg = if cos_lat < 1e-6 {
        360.0
    } else {
        (meters / (METERS_PER_DEGREE * cos_lat)).min(360.0)
    };
    (lat_deg, lng_deg)
}
