//! Shared attack context threaded through the coverage, trilateration, and
//! bisection stages.
//!
//! Bundling the host/clock/projection/pool/config/trace references into one
//! struct avoids an eight-plus-parameter signature on every stage function.

use std::path::Path;

use tracing::warn;

use crate::attacker::{AttackerError, AttackerPool, Clock, place_at_coords};
use crate::config::AttackConfig;
use crate::host::LocationHost;
use crate::oracle::{Answer, Oracle};
use crate::projection::Projection;
use crate::trace::AttackTrace;
use crate::types::GeoPoint;

pub struct AttackContext<'a, H: LocationHost, C: Clock, P: Projection> {
    pub host: &'a mut H,
    pub clock: &'a C,
    pub proj: &'a P,
    pub pool: &'a mut AttackerPool,
    pub config: &'a AttackConfig,
    pub trace: &'a mut AttackTrace,
    pub kml_dir: Option<&'a Path>,
    pub service: &'a str,
    pub test_id: &'a str,
    pub victim_identity: &'a str,
    pub queries: u64,
}

impl<'a, H: LocationHost, C: Clock, P: Projection> AttackContext<'a, H, C, P> {
    /// Places the current attacker at `point`, waiting out speed limits and
    /// rotating past placement failures. Adds the host-reported query cost
    /// to the running total.
    pub fn place_attacker_at(&mut self, point: GeoPoint) -> Result<(), AttackerError> {
        let queries_used = place_at_coords(self.pool, self.host, self.clock, self.proj, self.config, point)?;
        self.queries += queries_used as u64;
        Ok(())
    }

    pub fn current_attacker_location(&self) -> Option<GeoPoint> {
        self.pool.current().and_then(|u| u.lat_lon)
    }

    /// Places the current attacker at `point` and probes `oracle` for the
    /// distance to the victim, retrying up to `oracle_retry_limit` times
    /// (rotating attackers between attempts) when the host gives no answer.
    pub fn probe(&mut self, oracle: &Oracle, point: GeoPoint) -> Result<Answer, AttackerError> {
        for attempt in 0..self.config.oracle_retry_limit {
            self.place_attacker_at(point)?;
            let attacker = self.pool.current().ok_or(AttackerError::EmptyPool)?.identity.clone();
            let (answer, consumed) = oracle.in_proximity(self.host, &attacker, self.victim_identity, self.test_id);
            self.queries += consumed;
            if !matches!(answer, Answer::Disk(None) | Answer::Rounded(None)) {
                return Ok(answer);
            }
            warn!(attempt, "oracle returned no answer, rotating attacker");
            self.pool.rotate(self.clock, self.config.rotation_cooldown);
        }
        Ok(match oracle {
            Oracle::Disk { .. } => Answer::Disk(None),
            Oracle::Rounding { .. } => Answer::Rounded(None),
        })
    }
}
