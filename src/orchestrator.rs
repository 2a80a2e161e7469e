//! Attack orchestrator: wires the coverage/trilateration seed stages
//! into the shared bisection loop and owns the per-attack trace.

use std::path::Path;

use thiserror::Error;

use crate::attacker::{AttackerError, AttackerPool, Clock};
use crate::bisection::{self, BisectionError};
use crate::config::AttackConfig;
use crate::context::AttackContext;
use crate::coverage::{self, CoverageError};
use crate::host::LocationHost;
use crate::kml::KmlError;
use crate::oracle::{Oracle, RoundingClass};
use crate::projection::Projection;
use crate::trace::{AttackTrace, TraceError};
use crate::trilateration::{self, TrilaterationError};
use crate::types::{GeoPoint, TypeError};
use geo::MultiPolygon;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AttackError {
    #[error(transparent)]
    Coverage(#[from] CoverageError),
    #[error(transparent)]
    Trilateration(#[from] TrilaterationError),
    #[error(transparent)]
    Bisection(#[from] BisectionError),
    #[error(transparent)]
    Attacker(#[from] AttackerError),
    #[error(transparent)]
    Kml(#[from] KmlError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("no disk radius in the covered area was confirmed by the oracle")]
    CoverageExhausted,
    #[error("no rounding class matched any trilateration probe")]
    TrilaterationUnresolved,
    #[error("at least one disk radius must be supplied")]
    NoRadii,
}

pub type Result<T> = std::result::Result<T, AttackError>;

/// Drives one full attack against a single victim, owning the attacker pool
/// and a trace allocated fresh for this instance, never shared at type or
/// module scope.
pub struct AttackEngine<H: LocationHost, C: Clock, P: Projection> {
    host: H,
    clock: C,
    proj: P,
    pool: AttackerPool,
    config: AttackConfig,
    trace: AttackTrace,
    service: String,
    victim_identity: String,
    real_location: Option<GeoPoint>,
}

impl<H: LocationHost, C: Clock, P: Projection> AttackEngine<H, C, P> {
    pub fn new(
        host: H,
        clock: C,
        proj: P,
        pool: AttackerPool,
        config: AttackConfig,
        service: impl Into<String>,
        victim_identity: impl Into<String>,
        real_location: Option<GeoPoint>,
    ) -> Self {
        Self {
            host,
            clock,
            proj,
            pool,
            config,
            trace: AttackTrace::new(),
            service: service.into(),
            victim_identity: victim_identity.into(),
            real_location,
        }
    }

    fn context<'a>(&'a mut self, test_id: &'a str, kml_dir: Option<&'a Path>) -> AttackContext<'a, H, C, P> {
        AttackContext {
            host: &mut self.host,
            clock: &self.clock,
            proj: &self.proj,
            pool: &mut self.pool,
            config: &self.config,
            trace: &mut self.trace,
            kml_dir,
            service: &self.service,
            test_id,
            victim_identity: &self.victim_identity,
            queries: 0,
        }
    }

    /// Runs the DUDP (binary disk-disclosure) attack: tessellate
    /// `search_area` with the coarsest usable disk radius, locate the
    /// victim's cell, then bisect it down to the terminal area. Returns the
    /// geodesic error in metres.
    pub fn dudp_attack(
        &mut self,
        search_area: &MultiPolygon<f64>,
        disk_radii_km: &[f64],
        test_id: &str,
        kml_dir: Option<&Path>,
        grid_step_m: f64,
    ) -> Result<f64> {
        if disk_radii_km.is_empty() {
            return Err(AttackError::NoRadii);
        }
        self.config.grid_size_m = grid_step_m;
        let real_location = self.real_location;

        let mut ctx = self.context(test_id, kml_dir);
        let seed = coverage::run_coverage(&mut ctx, search_area, disk_radii_km)?;
        let (candidate, radius_km) = seed.ok_or(AttackError::CoverageExhausted)?;

        let outcome = bisection::run_bisection(&mut ctx, candidate, radius_km, real_location)?;
        if let Some(kml_dir) = kml_dir {
            self.flush_trace(kml_dir, test_id, "dudp")?;
        }
        Ok(outcome.error_m.unwrap_or(f64::NAN))
    }

    /// Runs the RUDP (rounded-distance-disclosure) attack: trilaterate from
    /// three ring probes to seed a candidate, then bisect it down using the
    /// finest rounding resolution among `rounding_classes`. Returns the
    /// geodesic error in metres.
    pub fn rudp_attack(
        &mut self,
        search_area: &MultiPolygon<f64>,
        rounding_classes: &[RoundingClass],
        test_id: &str,
        kml_dir: Option<&Path>,
        grid_step_m: f64,
    ) -> Result<f64> {
        if rounding_classes.is_empty() {
            return Err(AttackError::NoRadii);
        }
        self.config.grid_size_m = grid_step_m;
        let real_location = self.real_location;
        let finest_rounding_km = rounding_classes
            .iter()
            .map(|cl| cl.rounding_km)
            .fold(f64::INFINITY, f64::min);

        let oracle = Oracle::rounding(rounding_classes.to_vec());
        let mut ctx = self.context(test_id, kml_dir);
        let candidate = trilateration::run_trilateration(&mut ctx, search_area, &oracle)?
            .ok_or(AttackError::TrilaterationUnresolved)?;

        let outcome = bisection::run_bisection(&mut ctx, candidate, finest_rounding_km, real_location)?;
        if let Some(kml_dir) = kml_dir {
            self.flush_trace(kml_dir, test_id, "rudp")?;
        }
        Ok(outcome.error_m.unwrap_or(f64::NAN))
    }

    fn flush_trace(&self, kml_dir: &Path, test_id: &str, stage: &str) -> Result<()> {
        self.trace.flush(kml_dir, &self.service, stage, test_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::{Duration, Instant};

    use geo::{Coord, LineString, Polygon};

    use super::*;
    use crate::attacker::AuditorUser;
    use crate::geodesy::haversine_distance_km;
    use crate::host::{HostError, PlacementOutcome};
    use crate::oracle::RoundingFamily;
    use crate::projection::IdentityProjection;

    /// A clock that never actually blocks, so tests don't pay wall-clock
    /// cooldowns/settle delays; `now()` still advances monotonically so the
    /// speed-cap arithmetic in `attacker.rs` has something to compare.
    struct NullClock {
        base: Instant,
        offset: RefCell<Duration>,
    }

    impl NullClock {
        fn new() -> Self {
            Self { base: Instant::now(), offset: RefCell::new(Duration::ZERO) }
        }
    }

    impl Clock for NullClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.borrow()
        }

        fn sleep(&self, duration: Duration) {
            *self.offset.borrow_mut() += duration;
        }
    }

    /// A host that tracks each attacker's last asserted position and answers
    /// truthfully, optionally failing a fixed number of upcoming calls.
    struct ScenarioHost {
        victim: GeoPoint,
        positions: std::collections::HashMap<String, GeoPoint>,
        fail_queries_remaining: u32,
    }

    impl ScenarioHost {
        fn new(victim: GeoPoint) -> Self {
            Self { victim, positions: Default::default(), fail_queries_remaining: 0 }
        }
    }

    impl LocationHost for ScenarioHost {
        fn place_at(&mut self, attacker: &str, point: GeoPoint) -> std::result::Result<PlacementOutcome, HostError> {
            self.positions.insert(attacker.to_string(), point);
            Ok(PlacementOutcome { queries_used: 1, speed_limit_kph: None })
        }

        fn query_distance(&mut self, attacker: &str, _victim: &str, _test_id: &str) -> std::result::Result<f64, HostError> {
            if self.fail_queries_remaining > 0 {
                self.fail_queries_remaining -= 1;
                return Err(HostError::Recoverable("simulated transient failure".into()));
            }
            let from = self.positions.get(attacker).copied().expect("attacker was placed before querying");
            Ok(haversine_distance_km(&from, &self.victim))
        }
    }

    fn square_km(half_km: f64) -> MultiPolygon<f64> {
        let half_m = half_km * 1000.0;
        MultiPolygon::new(vec![Polygon::new(
            LineString::new(vec![
                Coord { x: -half_m, y: -half_m },
                Coord { x: half_m, y: -half_m },
                Coord { x: half_m, y: half_m },
                Coord { x: -half_m, y: half_m },
                Coord { x: -half_m, y: -half_m },
            ]),
            vec![],
        )])
    }

    fn engine(victim: GeoPoint, query_limit: u64) -> AttackEngine<ScenarioHost, NullClock, IdentityProjection> {
        let host = ScenarioHost::new(victim);
        let clock = NullClock::new();
        let proj = IdentityProjection::new(100_000.0);
        let pool = AttackerPool::new(vec![AuditorUser::new("a1"), AuditorUser::new("a2")]).unwrap();
        let mut config = AttackConfig::default();
        config.query_limit = query_limit;
        AttackEngine::new(host, clock, proj, pool, config, "svc", "victim", Some(victim))
    }

    #[test]
    fn disk_single_step_recovers_victim() {
        let victim = GeoPoint::new(0.045, 0.045).unwrap(); // ~5 km, 5 km in this projection's scale
        let mut eng = engine(victim, 150);
        let area = square_km(5.0);

        let error_m = eng.dudp_attack(&area, &[1.0], "t1", None, 20.0).unwrap();
        assert!(error_m < 1000.0, "error too large: {error_m} m");
    }

    #[test]
    fn disk_nested_radii_picks_coarsest_then_bisects() {
        let victim = GeoPoint::new(0.027, 0.063).unwrap(); // ~3 km, 7 km
        let mut eng = engine(victim, 250);
        let area = square_km(10.0);

        let error_m = eng.dudp_attack(&area, &[8.0, 2.0, 0.5], "t2", None, 20.0).unwrap();
        assert!(error_m < 500.0, "error too large: {error_m} m");
    }

    #[test]
    fn budget_exhaustion_terminates_cleanly_and_flushes_trace() {
        let victim = GeoPoint::new(0.045, 0.045).unwrap();
        let mut eng = engine(victim, 10);
        let area = square_km(5.0);

        let dir = std::env::temp_dir().join(format!("geoaudit_orch_test_budget_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let result = eng.dudp_attack(&area, &[1.0], "t3", Some(&dir), 20.0);
        assert!(result.is_ok(), "budget exhaustion should terminate cleanly: {result:?}");

        let trace_path = dir.join("files").join("json").join("svc_dudp_t3.json");
        assert!(trace_path.exists(), "trace JSON should have been flushed");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn attacker_rotation_survives_repeated_host_failures() {
        let victim = GeoPoint::new(0.045, 0.045).unwrap();
        let mut eng = engine(victim, 150);
        eng.host.fail_queries_remaining = 6;
        let area = square_km(5.0);

        let error_m = eng.dudp_attack(&area, &[1.0], "t4", None, 20.0).unwrap();
        assert!(error_m < 1000.0, "error too large after rotation: {error_m} m");
    }

    #[test]
    fn rounding_up_trilateration_seeds_a_tight_bisection() {
        let victim = GeoPoint::new(0.0, 0.0).unwrap();
        let mut eng = engine(victim, 200);
        let area = square_km(50.0);

        let classes = vec![RoundingClass::new(0.0, f64::INFINITY, 0.005, RoundingFamily::Up)];
        let error_m = eng.rudp_attack(&area, &classes, "t5", None, 20.0).unwrap();
        assert!(error_m < 100.0, "error too large: {error_m} m");
    }
}
