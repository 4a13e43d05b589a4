//! Spherical geometry helpers.
//!
//! Distances use the haversine formula on a sphere of radius
//! [`EARTH_RADIUS_METERS`]. The antimeridian and the poles are not
//! special-cased.

/// Mean Earth radius used for all distance calculations, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Approximate length of one degree of latitude, in meters.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Great-circle distance in meters between two `(lat, lng)` points given in degrees.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Scales a coordinate to an integer number of 1e-4 degree steps.
pub fn to_e4(degrees: f64) -> i64 {
    (degrees * 10_000.0).round() as i64
}

/// Inverse of [`to_e4`].
pub fn from_e4(steps: i64) -> f64 {
    steps as f64 / 10_000.0
}
