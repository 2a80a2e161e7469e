//! Geographic-to-planar projection adapter.
//!
//! The engine is generic over any [`Projection`] implementation (the core
//! "accepts an opaque forward/inverse projection", per design) rather than
//! depending on a specific cartographic projection. This module provides two
//! concrete implementations: [`EquidistantProjection`], an azimuthal
//! equidistant projection centered on a reference point (preserving distance
//! from that center, the property the geometry layer relies on), and
//! [`IdentityProjection`], a flat-earth projection used by tests.

use crate::geodesy::{bearing_between_deg, haversine_distance_km, point_on_earth};
use crate::types::{GeoPoint, TypeError, XyPoint};

/// A stateless geographic <-> planar coordinate transform.
///
/// One instance is shared for the duration of an attack.
pub trait Projection {
    /// Projects a geographic point to the plane, in metres.
    fn forward(&self, point: &GeoPoint) -> XyPoint;

    /// Projects a planar point back to a geographic point.
    fn inverse(&self, point: &XyPoint) -> Result<GeoPoint, TypeError>;
}

/// Azimuthal equidistant projection centered on a fixed reference point.
///
/// Distances and bearings from `origin` are preserved exactly on the sphere;
/// distortion grows with distance from the origin and off-axis, which is why
/// the geometry layer corrects for it locally via [`proj_error`].
#[derive(Clone, Copy, Debug)]
pub struct EquidistantProjection {
    origin: GeoPoint,
}

impl EquidistantProjection {
    pub fn new(origin: GeoPoint) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }
}

impl Projection for EquidistantProjection {
    fn forward(&self, point: &GeoPoint) -> XyPoint {
        let dist_m = haversine_distance_km(&self.origin, point) * 1000.0;
        let bearing = bearing_between_deg(&self.origin, point).to_radians();
        XyPoint::new(dist_m * bearing.cos(), dist_m * bearing.sin())
    }

    fn inverse(&self, point: &XyPoint) -> Result<GeoPoint, TypeError> {
        let dist_km = point.x.hypot(point.y) / 1000.0;
        let bearing_deg = point.y.atan2(point.x).to_degrees();
        point_on_earth(&self.origin, dist_km, bearing_deg)
    }
}

/// A flat-earth projection for tests: `GeoPoint` fields are interpreted
/// directly as planar coordinates, scaled by a fixed factor (default 1000,
/// i.e. `GeoPoint` units are kilometres and planar units are metres).
#[derive(Clone, Copy, Debug)]
pub struct IdentityProjection {
    scale_m_per_unit: f64,
}

impl IdentityProjection {
    pub fn new(scale_m_per_unit: f64) -> Self {
        Self { scale_m_per_unit }
    }
}

impl Default for IdentityProjection {
    fn default() -> Self {
        Self {
            scale_m_per_unit: 1000.0,
        }
    }
}

impl Projection for IdentityProjection {
    fn forward(&self, point: &GeoPoint) -> XyPoint {
        XyPoint::new(point.lon() * self.scale_m_per_unit, point.lat() * self.scale_m_per_unit)
    }

    fn inverse(&self, point: &XyPoint) -> Result<GeoPoint, TypeError> {
        GeoPoint::new(point.y / self.scale_m_per_unit, point.x / self.scale_m_per_unit)
    }
}

/// Local planar distortion of `proj` at `point`, measured at geodesic
/// distance `r_m` on bearing `angle_deg`.
///
/// Generates a point at distance `r_m` from `point` on the given bearing,
/// projects both, and returns the difference between the planar and the
/// intended geodesic distance. Used to dilate rings/disks so that their
/// intended geodesic radii are honoured in the plane.
pub fn proj_error(
    proj: &impl Projection,
    point: &GeoPoint,
    r_m: f64,
    angle_deg: f64,
) -> Result<f64, TypeError> {
    let probe = point_on_earth(point, r_m / 1000.0, angle_deg)?;
    let p0 = proj.forward(point);
    let p1 = proj.forward(&probe);
    let planar_dist = (p1.x - p0.x).hypot(p1.y - p0.y);
    Ok(planar_dist - r_m)
}
