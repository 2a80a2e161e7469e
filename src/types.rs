//! Core point types shared across the engine.
//!
//! `GeoPoint` enforces valid latitude/longitude as a type invariant, rejecting
//! out-of-range degrees at construction rather than deferring the check to
//! callers.

use approx::{AbsDiffEq, RelativeEq, abs_diff_eq, relative_eq};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum TypeError {
    #[error("invalid latitude {0} (must be in [-90, 90])")]
    InvalidLatitude(f64),
    #[error("invalid longitude {0} (must be in [-180, 180])")]
    InvalidLongitude(f64),
}

pub type Result<T> = std::result::Result<T, TypeError>;

/// A point on the surface of the WGS84 sphere, in degrees.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<GeoPoint> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(TypeError::InvalidLatitude(lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(TypeError::InvalidLongitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Get point latitude in degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Get point longitude in degrees.
    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl Default for GeoPoint {
    fn default() -> GeoPoint {
        GeoPoint { lat: 0.0, lon: 0.0 }
    }
}

impl AbsDiffEq for GeoPoint {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        abs_diff_eq!(self.lat, other.lat, epsilon = epsilon)
            && abs_diff_eq!(self.lon, other.lon, epsilon = epsilon)
    }
}

impl RelativeEq for GeoPoint {
    fn default_max_relative() -> Self::Epsilon {
        0.000_000_000_000_001
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        relative_eq!(self.lat, other.lat, epsilon = epsilon, max_relative = max_relative)
            && relative_eq!(self.lon, other.lon, epsilon = epsilon, max_relative = max_relative)
    }
}

/// A point on a 2D projected plane, in metres.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct XyPoint {
    pub x: f64,
    pub y: f64,
}

impl XyPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Instantiate a `GeoPoint` with a tuple-like syntax.
#[macro_export]
macro_rules! geo_point {
    ( $lat:expr, $lon:expr ) => {
        $crate::types::GeoPoint::new($lat, $lon)?
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_latitude() {
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(TypeError::InvalidLatitude(91.0))
        );
        assert_eq!(
            GeoPoint::new(-91.0, 0.0),
            Err(TypeError::InvalidLatitude(-91.0))
        );
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert_eq!(
            GeoPoint::new(0.0, 181.0),
            Err(TypeError::InvalidLongitude(181.0))
        );
    }

    #[test]
    fn accepts_boundary_values() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
    }
}
