//! The network-facing seam between the engine and a location-based service.
//!
//! A narrow trait at the boundary between this engine and whatever transport
//! a real LBS integration uses. Tests supply an in-memory mock; a live
//! integration supplies an HTTP client. The core never depends on either.

use thiserror::Error;

use crate::types::GeoPoint;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum HostError {
    /// Transient failure (timeout, rate limit, momentary desync); the caller
    /// should retry, typically after rotating to a different attacker.
    #[error("recoverable host error: {0}")]
    Recoverable(String),
    /// Non-retryable failure; the caller should abort the attack.
    #[error("fatal host error: {0}")]
    Fatal(String),
}

/// Result of a successful placement: how many queries the host attributes
/// to it, and the host's advertised speed limit in km/h, if any (consumed by
/// the attacker-pool controller's speed cap).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementOutcome {
    pub queries_used: u32,
    pub speed_limit_kph: Option<f64>,
}

/// Primitives the engine needs from a location-based service.
pub trait LocationHost {
    /// Moves `attacker`'s asserted location to `point`.
    fn place_at(&mut self, attacker: &str, point: GeoPoint) -> Result<PlacementOutcome, HostError>;

    /// Queries the raw (possibly rounded, possibly thresholded upstream)
    /// distance the service discloses between `attacker` and `victim` for a
    /// proximity test identified by `test_id`.
    fn query_distance(&mut self, attacker: &str, victim: &str, test_id: &str) -> Result<f64, HostError>;
}
