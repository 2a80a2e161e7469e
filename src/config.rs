//! Attack tunables.
//!
//! Every knob enumerated by the external interface lives here as a field of
//! an explicit, constructor-threaded struct, never a module-level global or
//! a mutable shared dictionary.

use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct AttackConfig {
    /// Terminal resolution of the bisection cut search, in planar metres.
    pub grid_size_m: f64,
    /// Area floor (m^2) below which the bisection loop stops refining.
    pub binary_stop_area_m2: f64,
    /// Relative-area convergence guard for the bisection loop.
    pub min_reduction: f64,
    /// Ring/disk projection-error correction multiplier.
    pub ec: f64,
    /// Cool-off after the attacker pool is exhausted and refilled.
    pub rotation_cooldown: Duration,
    /// Settle delay after a successful placement, before the next probe.
    pub post_place_sleep: Duration,
    /// Retries on a `None`/host-failure oracle answer before rotating.
    pub oracle_retry_limit: u32,
    /// Maximum oracle queries for a single attack.
    pub query_limit: u64,
    /// Maximum attacker-pool refills before the attack aborts as fatal.
    pub max_restarts: u64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            grid_size_m: 20.0,
            binary_stop_area_m2: 100.0,
            min_reduction: 0.01,
            ec: 2.5,
            rotation_cooldown: Duration::from_secs(10),
            post_place_sleep: Duration::from_secs(3),
            oracle_retry_limit: 5,
            query_limit: 1000,
            max_restarts: 10,
        }
    }
}
