//! Attacker-pool controller: rotation, cool-off, and speed-capped placement.
//!
//! Suspension points (rotation cool-off, speed-limit waits) go through an
//! injectable [`Clock`] rather than `std::thread::sleep` directly, so tests
//! can drive the whole placement/rotation state machine without actually
//! waiting for wall-clock-bound behaviour.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AttackConfig;
use crate::geodesy::haversine_distance_km;
use crate::host::{HostError, LocationHost, PlacementOutcome};
use crate::projection::Projection;
use crate::types::{GeoPoint, XyPoint};

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AttackerError {
    #[error("attacker pool must have at least one attacker")]
    EmptyPool,
    #[error("attacker pool exhausted its restart budget ({max_restarts} refills)")]
    MaxRestartsExceeded { max_restarts: u64 },
    #[error(transparent)]
    Host(#[from] HostError),
}

/// A clock the engine can sleep against. Production code uses [`SystemClock`];
/// tests use a mock that advances logical time without blocking.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// The engine's view of one attacker identity: current confirmed placement
/// and the bookkeeping the speed cap needs.
#[derive(Clone, Debug)]
pub struct AuditorUser {
    pub identity: String,
    pub projected_location: Option<XyPoint>,
    pub lat_lon: Option<GeoPoint>,
    pub queries: u64,
    pub last_updated: Option<Instant>,
    pub speed_limit_kph: Option<f64>,
}

impl AuditorUser {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            projected_location: None,
            lat_lon: None,
            queries: 0,
            last_updated: None,
            speed_limit_kph: None,
        }
    }
}

/// A live queue of attackers plus an immutable backup list to refill from.
pub struct AttackerPool {
    backup: Vec<AuditorUser>,
    live: VecDeque<AuditorUser>,
    pub restart_times: u64,
}

impl AttackerPool {
    pub fn new(attackers: Vec<AuditorUser>) -> Result<Self, AttackerError> {
        if attackers.is_empty() {
            return Err(AttackerError::EmptyPool);
        }
        Ok(Self {
            backup: attackers.clone(),
            live: attackers.into(),
            restart_times: 0,
        })
    }

    pub fn current(&self) -> Option<&AuditorUser> {
        self.live.front()
    }

    pub fn current_mut(&mut self) -> Option<&mut AuditorUser> {
        self.live.front_mut()
    }

    /// Pops the current attacker and advances to the next. Refills from the
    /// backup list and cools off for `cooldown` when the live queue is
    /// exhausted.
    pub fn rotate(&mut self, clock: &impl Clock, cooldown: Duration) -> &mut AuditorUser {
        self.live.pop_front();
        if self.live.is_empty() {
            self.live = self.backup.clone().into();
            self.restart_times += 1;
            debug!(restart_times = self.restart_times, "attacker pool exhausted, cooling off");
            clock.sleep(cooldown);
        }
        self.live
            .front_mut()
            .expect("backup list is non-empty by construction")
    }
}

/// Places the pool's current attacker at `point`, waiting out any speed-limit
/// violation implied by the move, retrying with a rotated attacker on host
/// failure until one placement succeeds. Returns the number of queries the
/// host attributed to the successful placement.
#[tracing::instrument(level = "debug", skip(pool, host, clock, proj, config))]
pub fn place_at_coords(
    pool: &mut AttackerPool,
    host: &mut impl LocationHost,
    clock: &impl Clock,
    proj: &impl Projection,
    config: &AttackConfig,
    point: GeoPoint,
) -> Result<u32, AttackerError> {
    loop {
        let user = pool.current_mut().ok_or(AttackerError::EmptyPool)?;

        if let (Some(last_updated), Some(prev), Some(speed_limit_kph)) =
            (user.last_updated, user.lat_lon, user.speed_limit_kph)
        {
            let elapsed_h = clock.now().duration_since(last_updated).as_secs_f64() / 3600.0;
            let max_allowed_km = speed_limit_kph * elapsed_h;
            let dist_km = haversine_distance_km(&prev, &point);
            if dist_km > max_allowed_km {
                let wait_s = (dist_km - max_allowed_km) / speed_limit_kph + 1.0;
                debug!(wait_s, "waiting out speed limit before placement");
                clock.sleep(Duration::from_secs_f64(wait_s));
            }
        }

        let identity = user.identity.clone();
        match host.place_at(&identity, point) {
            Ok(PlacementOutcome { queries_used, speed_limit_kph }) => {
                let user = pool.current_mut().expect("just queried above");
                user.lat_lon = Some(point);
                user.projected_location = Some(proj.forward(&point));
                user.last_updated = Some(clock.now());
                user.queries += queries_used as u64;
                user.speed_limit_kph = speed_limit_kph;
                debug!(identity = %identity, "placed attacker");
                clock.sleep(config.post_place_sleep);
                return Ok(queries_used);
            }
            Err(err @ HostError::Fatal(_)) => {
                return Err(AttackerError::Host(err));
            }
            Err(err) => {
                warn!(%err, identity = %identity, "placement failed, rotating attacker");
                pool.rotate(clock, config.rotation_cooldown);
                if pool.restart_times > config.max_restarts {
                    return Err(AttackerError::MaxRestartsExceeded { max_restarts: config.max_restarts });
                }
            }
        }
    }
}
