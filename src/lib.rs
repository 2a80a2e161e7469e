//! Geometric discovery engine for auditing location-disclosure attacks
//! against proximity-based "friend nearby" services.
//!
//! Given a black-box proximity oracle (either a binary "within radius R"
//! disclosure, DUDP, or a rounded-distance disclosure, RUDP), this crate
//! recovers a consenting test account's true location by driving attacker
//! placements and composing spatial set operations (rings, disks, polygon
//! cuts) over a bounded search area. See [`orchestrator::AttackEngine`] for
//! the entry point.

pub mod attacker;
pub mod bisection;
pub mod config;
pub mod context;
pub mod coverage;
pub mod geodesy;
pub mod geometry;
pub mod host;
pub mod kml;
pub mod oracle;
pub mod orchestrator;
pub mod projection;
pub mod trace;
pub mod trilateration;
pub mod types;

pub use attacker::{AttackerError, AttackerPool, AuditorUser, Clock, SystemClock};
pub use config::AttackConfig;
pub use geodesy::{haversine_distance_km, point_on_earth};
pub use host::{HostError, LocationHost, PlacementOutcome};
pub use oracle::{Answer, Oracle, RoundingClass, RoundingFamily};
pub use orchestrator::{AttackEngine, AttackError};
pub use projection::{EquidistantProjection, IdentityProjection, Projection};
pub use types::{GeoPoint, TypeError, XyPoint};
