//! Spherical geodesy primitives.
//!
//! A pure-Rust spherical approximation rather than a wrapped ellipsoidal
//! geodesy library: the engine's accuracy budget is bounded by the oracle's
//! own disclosure radius (hundreds of metres), so the extra precision of a
//! full ellipsoidal solution buys nothing here and would otherwise pull in a
//! build-script/FFI dependency.

use crate::types::{GeoPoint, TypeError};

/// Mean Earth radius in km.
pub const EARTH_RADIUS_KM: f64 = 6378.1;

/// Great-circle (haversine) distance between two points, in km.
pub fn haversine_distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.lon() - a.lon()).to_radians();

    let sin_dlat2 = (dlat / 2.0).sin();
    let sin_dlon2 = (dlon / 2.0).sin();
    let h = sin_dlat2 * sin_dlat2 + lat1.cos() * lat2.cos() * sin_dlon2 * sin_dlon2;
    2.0 * h.sqrt().asin() * EARTH_RADIUS_KM
}

/// Solves the spherical forward geodesic problem: given a starting point, a
/// distance in km, and a bearing in degrees, returns the destination point.
///
/// Bearing convention: 0° is east, increasing counter-clockwise (the
/// auditor's convention, not true/compass bearing). Preserved here because
/// the trilateration stage places attackers at `i * 120 deg` in this frame.
pub fn point_on_earth(start: &GeoPoint, dist_km: f64, bearing_deg: f64) -> Result<GeoPoint, TypeError> {
    let brng = (90.0 - bearing_deg).to_radians();
    let lat1 = start.lat().to_radians();
    let lon1 = start.lon().to_radians();
    let delta = dist_km / EARTH_RADIUS_KM;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * brng.cos()).asin();
    let lon2 = lon1
        + (brng.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    let lat2_deg = lat2.to_degrees().clamp(-90.0, 90.0);
    let lon2_deg = wrap_longitude(lon2.to_degrees());

    GeoPoint::new(lat2_deg, lon2_deg)
}

/// Initial bearing from `a` to `b`, in the engine's own convention (0° is
/// east, increasing counter-clockwise). The inverse of [`point_on_earth`]'s
/// bearing argument: `point_on_earth(a, haversine_distance_km(a, b),
/// bearing_between_deg(a, b))` reproduces `b`.
pub fn bearing_between_deg(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let dlon = (b.lon() - a.lon()).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let compass_deg = y.atan2(x).to_degrees();
    90.0 - compass_deg
}

/// Wraps a longitude value into `[-180, 180]`.
fn wrap_longitude(lon: f64) -> f64 {
    let mut wrapped = (lon + 180.0) % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    wrapped - 180.0
}
