//! Coverage stage: tile the search area with the coarsest disk the
//! service supports, then probe grid vertices until one discloses the
//! victim.

use std::collections::HashSet;

use geo::{Area, MultiPolygon};
use thiserror::Error;
use tracing::info;

use crate::attacker::{AttackerError, Clock};
use crate::context::AttackContext;
use crate::geometry::{self, GeometryError};
use crate::host::LocationHost;
use crate::kml::{self, KmlError};
use crate::oracle::{Answer, Oracle};
use crate::projection::Projection;
use crate::trace::Stream;
use crate::types::{TypeError, XyPoint};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoverageError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Attacker(#[from] AttackerError),
    #[error(transparent)]
    Kml(#[from] KmlError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("no usable disk radius produced a non-empty grid")]
    NoUsableRadius,
}

pub type Result<T> = std::result::Result<T, CoverageError>;

/// Finds the coarsest radius (from `radii_desc_km`, any order) whose hex
/// grid over `search_area` yields at least one vertex.
fn coarsest_usable_radius(
    search_area: &MultiPolygon<f64>,
    radii_km: &[f64],
) -> Result<(f64, HashSet<(i64, i64)>)> {
    let mut sorted = radii_km.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    for r_km in sorted {
        let vertices = geometry::construct_grid_in_polygon(search_area, r_km * 1000.0)?;
        if !vertices.is_empty() {
            return Ok((r_km, vertices));
        }
    }
    Err(CoverageError::NoUsableRadius)
}

fn dist2(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

/// Nearest-neighbour tour over `vertices` starting from `start`. Replaces
/// the source algorithm's random shuffle: visiting nearby vertices first
/// avoids repeated long moves that the speed cap would otherwise penalise.
fn nearest_neighbor_tour(start: XyPoint, vertices: &HashSet<(i64, i64)>) -> Vec<(i64, i64)> {
    let mut remaining: Vec<(i64, i64)> = vertices.iter().copied().collect();
    let mut tour = Vec::with_capacity(remaining.len());
    let mut current = (start.x, start.y);

    while !remaining.is_empty() {
        let (idx, _) = remaining
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                dist2(current, (a.0 as f64, a.1 as f64))
                    .partial_cmp(&dist2(current, (b.0 as f64, b.1 as f64)))
                    .unwrap()
            })
            .expect("remaining is non-empty");
        let next = remaining.remove(idx);
        current = (next.0 as f64, next.1 as f64);
        tour.push(next);
    }
    tour
}

/// Runs the coverage stage: returns the first disk (and its radius in km)
/// that the oracle confirms contains the victim, or `None` if every vertex
/// answers false.
pub fn run_coverage<H: LocationHost, C: Clock, P: Projection>(
    ctx: &mut AttackContext<H, C, P>,
    search_area: &MultiPolygon<f64>,
    radii_km: &[f64],
) -> Result<Option<(MultiPolygon<f64>, f64)>> {
    let (r_km, vertices) = coarsest_usable_radius(search_area, radii_km)?;
    let oracle = Oracle::disk(r_km);
    info!(r_km, vertex_count = vertices.len(), "coverage grid constructed");

    let start = ctx
        .current_attacker_location()
        .map(|p| ctx.proj.forward(&p))
        .unwrap_or(XyPoint::new(0.0, 0.0));
    let tour = nearest_neighbor_tour(start, &vertices);

    for (x, y) in tour {
        let point = ctx.proj.inverse(&XyPoint::new(x as f64, y as f64))?;
        let answer = ctx.probe(&oracle, point)?;
        let disk = geometry::circle(&point, r_km * 1000.0, ctx.proj);

        if let Some(kml_dir) = ctx.kml_dir {
            let (path, _) = kml::write_kml(
                &geometry::as_multi(disk.clone()),
                ctx.proj,
                kml_dir,
                ctx.service,
                "coverage",
                ctx.test_id,
                ctx.pool.restart_times,
                ctx.queries,
                "probe",
            )?;
            ctx.trace
                .push_probe(Stream::Coverage, ctx.queries, path.display().to_string(), disk.unsigned_area());
        }

        if matches!(answer, Answer::Disk(Some(true))) {
            return Ok(Some((geometry::as_multi(disk), r_km)));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use geo::{Coord, LineString, Polygon};

    use super::*;

    #[test]
    fn coarsest_usable_radius_prefers_largest_that_fits() {
        let square = MultiPolygon::new(vec![Polygon::new(
            LineString::new(vec![
                Coord { x: -5000.0, y: -5000.0 },
                Coord { x: 5000.0, y: -5000.0 },
                Coord { x: 5000.0, y: 5000.0 },
                Coord { x: -5000.0, y: 5000.0 },
                Coord { x: -5000.0, y: -5000.0 },
            ]),
            vec![],
        )]);
        // 50 km is far too large to tessellate a 10x10 km square; 0.5 km fits.
        let (r_km, vertices) = coarsest_usable_radius(&square, &[50.0, 0.5]).unwrap();
        assert_eq!(r_km, 0.5);
        assert!(!vertices.is_empty());
    }

    #[test]
    fn nearest_neighbor_tour_visits_every_vertex_once() {
        let vertices: HashSet<(i64, i64)> = [(0, 0), (10, 0), (0, 10), (10, 10)].into_iter().collect();
        let tour = nearest_neighbor_tour(XyPoint::new(0.0, 0.0), &vertices);
        assert_eq!(tour.len(), vertices.len());
        let tour_set: HashSet<_> = tour.into_iter().collect();
        assert_eq!(tour_set, vertices);
    }
}
