//! Polygon and cell geometry over a projected plane.
//!
//! This is the numerical heart of the engine: every probe the attack issues
//! is shaped here (a disk, a ring, a bisection cut, a hex-grid cover) before
//! it is projected back to lat/lon for placement. Built on `geo_types`
//! polygons and the `geo` crate's boolean-op / area / centroid algorithms
//! rather than hand-rolled clipping, the way the reference geometry pack
//! composes those algorithm traits over its own shapes.

use std::collections::HashSet;

use geo::{Area, BooleanOps, BoundingRect, Centroid, Coord, Intersects, LineString, MultiPolygon, Polygon};
use thiserror::Error;

use crate::projection::{Projection, proj_error};
use crate::types::{GeoPoint, TypeError, XyPoint};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GeometryError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("polygon has no area to operate on")]
    EmptyPolygon,
}

pub type Result<T> = std::result::Result<T, GeometryError>;

/// Number of vertices used to approximate a disk as a polygon. Chordal error
/// at this count stays well under typical grid resolutions (tens of metres)
/// for the disk radii this engine probes with (tens of metres to kilometres).
const CIRCLE_VERTICES: usize = 64;

pub(crate) fn circle_at(center: XyPoint, r_m: f64) -> Polygon<f64> {
    let r_m = r_m.max(0.0);
    let mut coords: Vec<Coord<f64>> = (0..CIRCLE_VERTICES)
        .map(|i| {
            let theta = 2.0 * std::f64::consts::PI * (i as f64) / (CIRCLE_VERTICES as f64);
            Coord {
                x: center.x + r_m * theta.cos(),
                y: center.y + r_m * theta.sin(),
            }
        })
        .collect();
    coords.push(coords[0]);
    Polygon::new(LineString::new(coords), vec![])
}

pub(crate) fn as_multi(poly: Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![poly])
}

/// Disk of radius `r_m` around `point`, projected into the plane.
pub fn circle(point: &GeoPoint, r_m: f64, proj: &impl Projection) -> Polygon<f64> {
    circle_at(proj.forward(point), r_m)
}

/// Annulus between `r_outer_m` and `r_inner_m` around `point`, with each
/// radius corrected for local projection distortion (weighted by `ec`).
/// Returns `None` when the two radii coincide (a degenerate, zero-width
/// ring).
pub fn ring(
    point: &GeoPoint,
    r_outer_m: f64,
    r_inner_m: f64,
    proj: &impl Projection,
    ec: f64,
) -> Result<Option<MultiPolygon<f64>>> {
    if (r_outer_m - r_inner_m).abs() < f64::EPSILON {
        return Ok(None);
    }

    let e_in = ec * proj_error(proj, point, r_inner_m, 0.0)?;
    let e_out = ec * proj_error(proj, point, r_outer_m, 0.0)?;
    let r_inner_corrected = (r_inner_m - e_in.abs()).max(0.0);
    let r_outer_corrected = r_outer_m + e_out.abs();

    let center = proj.forward(point);
    let outer = as_multi(circle_at(center, r_outer_corrected));
    let inner = as_multi(circle_at(center, r_inner_corrected));
    Ok(Some(outer.difference(&inner)))
}

/// Area-weighted centroid of `poly`, inverse-projected to lat/lon.
pub fn poly_centroid(poly: &MultiPolygon<f64>, proj: &impl Projection) -> Result<GeoPoint> {
    let c = poly.centroid().ok_or(GeometryError::EmptyPolygon)?;
    Ok(proj.inverse(&XyPoint::new(c.x(), c.y()))?)
}

/// Finds a planar point such that a disk of radius `r_km` centred there cuts
/// `poly` into approximately equal halves by area.
///
/// This is the primitive the bisection stage drives: each call proposes
/// the next probe disk. The search scans the longer bounding-box axis,
/// holding the shorter axis fixed at the box's mid-line, bisecting towards
/// the candidate centre whose cut area is closest to half of `poly`'s area.
pub fn cut(poly: &MultiPolygon<f64>, proj: &impl Projection, r_km: f64, grid_step: f64) -> Result<XyPoint> {
    let r_m = r_km * 1000.0;
    let area = poly.unsigned_area();
    let half = area / 2.0;
    let grid_step = if half < 1000.0 { 1.0 } else { grid_step };

    let bounds = poly.bounding_rect().ok_or(GeometryError::EmptyPolygon)?;
    let width = bounds.max().x - bounds.min().x;
    let height = bounds.max().y - bounds.min().y;
    let scan_along_x = height > width;

    let fixed = if scan_along_x {
        (bounds.min().y + bounds.max().y) / 2.0
    } else {
        (bounds.min().x + bounds.max().x) / 2.0
    };
    let mut lo = if scan_along_x {
        bounds.min().x - r_m
    } else {
        bounds.min().y - r_m
    };
    let mut hi = if scan_along_x {
        bounds.max().x - r_m
    } else {
        bounds.max().y - r_m
    };

    let centre_at = |axis_val: f64| -> XyPoint {
        if scan_along_x {
            XyPoint::new(axis_val, fixed)
        } else {
            XyPoint::new(fixed, axis_val)
        }
    };

    let mut r = r_m;
    let mut evaluate = |axis_val: f64| -> Result<f64> {
        let centre = centre_at(axis_val);
        let centre_geo = proj.inverse(&centre)?;
        r += proj_error(proj, &centre_geo, r, 0.0)?;
        let disk = as_multi(circle_at(centre, r));
        let cut_area = poly.intersection(&disk).unsigned_area();
        Ok((half - cut_area).floor())
    };

    let mut best_axis = (lo + hi) / 2.0;
    let mut best_diff = f64::INFINITY;

    let max_iters = (((hi - lo).abs() / grid_step).ceil() as usize).saturating_add(2);
    for _ in 0..max_iters {
        if (hi - lo).abs() <= grid_step {
            break;
        }
        let mid = (lo + hi) / 2.0;
        let diff = evaluate(mid)?;
        if diff.abs() < best_diff.abs() {
            best_diff = diff;
            best_axis = mid;
        }
        if diff == 0.0 {
            break;
        } else if diff < 0.0 {
            hi -= grid_step;
        } else {
            lo += grid_step;
        }
    }

    Ok(centre_at(best_axis))
}

fn quantize(p: XyPoint) -> (i64, i64) {
    (p.x.round() as i64, p.y.round() as i64)
}

/// Horizontal-line crossings of `mp` at height `y`, as `(x_enter, x_exit)`
/// pairs under the even-odd fill rule (holes included via their own rings).
fn scanline_intervals(mp: &MultiPolygon<f64>, y: f64) -> Vec<(f64, f64)> {
    let mut xs = Vec::new();
    for poly in mp.iter() {
        for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
            for w in ring.0.windows(2) {
                let (p0, p1) = (w[0], w[1]);
                if (p0.y <= y) != (p1.y <= y) {
                    let t = (y - p0.y) / (p1.y - p0.y);
                    xs.push(p0.x + t * (p1.x - p0.x));
                }
            }
        }
    }
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    xs.chunks_exact(2).map(|c| (c[0], c[1])).collect()
}

#[cfg(feature = "rayon")]
macro_rules! iter_work {
    ($items:expr) => {{
        use rayon::prelude::*;
        $items.par_iter()
    }};
}
#[cfg(not(feature = "rayon"))]
macro_rules! iter_work {
    ($items:expr) => {
        $items.iter()
    };
}

/// Tiles `poly` with a pointy-top hexagonal grid of circumradius `r_m` and
/// returns the quantised vertex set used to drive the disk-cover (coverage)
/// stage. Row pitch is `3R/2`; column pitch is `R*sqrt(3)`; alternate rows
/// are offset by half the column pitch.
pub fn construct_grid_in_polygon(poly: &MultiPolygon<f64>, r_m: f64) -> Result<HashSet<(i64, i64)>> {
    let bounds = poly.bounding_rect().ok_or(GeometryError::EmptyPolygon)?;
    let row_pitch = 1.5 * r_m;
    let col_pitch = r_m * 3f64.sqrt();

    let min_x = bounds.min().x;
    let min_y = bounds.min().y;
    let max_y = bounds.max().y;

    let num_rows = (((max_y - min_y) / row_pitch).ceil() as i64).max(0);
    let rows: Vec<i64> = (0..=num_rows).collect();

    let neighbor_offsets = [
        (col_pitch, 0.0),
        (-col_pitch, 0.0),
        (col_pitch / 2.0, row_pitch),
        (-col_pitch / 2.0, row_pitch),
        (col_pitch / 2.0, -row_pitch),
        (-col_pitch / 2.0, -row_pitch),
    ];

    let per_row: Vec<Vec<XyPoint>> = iter_work!(rows)
        .map(|&row_idx| {
            let y = min_y + row_idx as f64 * row_pitch;
            let offset = if row_idx % 2 != 0 { col_pitch / 2.0 } else { 0.0 };
            let mut candidates = Vec::new();
            for (x0, x1) in scanline_intervals(poly, y) {
                let start_k = ((x0 - min_x - offset) / col_pitch).ceil() as i64;
                let mut k = start_k;
                loop {
                    let x = min_x + offset + k as f64 * col_pitch;
                    if x > x1 {
                        break;
                    }
                    if x >= x0 {
                        candidates.push(XyPoint::new(x, y));
                    }
                    k += 1;
                }
            }
            candidates
        })
        .collect();

    let mut vertices = HashSet::new();
    for vertex in per_row.into_iter().flatten() {
        vertices.insert(quantize(vertex));
        for (dx, dy) in neighbor_offsets {
            let neighbor = XyPoint::new(vertex.x + dx, vertex.y + dy);
            let disk = as_multi(circle_at(neighbor, r_m));
            if poly.intersects(&disk) {
                vertices.insert(quantize(neighbor));
            }
        }
    }

    Ok(vertices)
}
