//! Restore rectilinear outlines after buffering or hull operations.
//!
//! A mitred buffer or a convex hull can leave diagonal edges in an otherwise
//! Manhattan outline. Each diagonal edge between two points is replaced by an
//! axis-parallel corner: the [`ManhattanPolicy::Outer`] policy replaces the two
//! points by the corner that extends the neighbouring edge, the
//! [`ManhattanPolicy::Inner`] policy keeps both points and inserts the other
//! corner of the diagonal's bounding box between them.

use log::debug;

use crate::error::GeometryError;
use crate::geometry::{approx_eq, Point, Polygon, Shape};
use crate::planar::PlanarGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManhattanPolicy {
    /// Corner enclosing the most area; used after outward growth.
    Outer,
    /// Corner enclosing the least area; used after a hull-based connect.
    Inner,
}

impl ManhattanPolicy {
    fn opposite(self) -> Self {
        match self {
            ManhattanPolicy::Outer => ManhattanPolicy::Inner,
            ManhattanPolicy::Inner => ManhattanPolicy::Outer,
        }
    }
}

fn manhattan_ring(
    ring: &[Point],
    policy: ManhattanPolicy,
    eps: f64,
) -> Result<Vec<Point>, GeometryError> {
    let same_x = |a: &Point, b: &Point| approx_eq(a.x, b.x, eps);
    let same_y = |a: &Point, b: &Point| approx_eq(a.y, b.y, eps);

    let n = ring.len();
    let mut out: Vec<Point> = Vec::with_capacity(n + 4);
    let mut prev: Option<Point> = None;
    let mut idx = 0;
    while idx < n {
        let mut coord = ring[idx];
        idx += 1;
        if idx == n {
            out.push(coord);
            break;
        }
        let next = ring[idx];

        if !same_x(&coord, &next) && !same_y(&coord, &next) {
            idx += 1;
            // Corner on the horizontal through `coord`, or on its vertical.
            let on_row = Point::new(next.x, coord.y);
            let on_col = Point::new(coord.x, next.y);
            let extend_vertical = match prev {
                Some(p) if same_x(&p, &coord) => true,
                Some(p) if same_y(&p, &coord) => false,
                Some(p) => {
                    return Err(GeometryError::NonManhattan {
                        prev: p,
                        coord,
                        next,
                    })
                }
                None => {
                    let next2 = ring.get(idx).copied().unwrap_or(ring[0]);
                    if same_x(&next, &next2) {
                        false
                    } else if same_y(&next, &next2) {
                        true
                    } else {
                        return Err(GeometryError::NonManhattan {
                            prev: coord,
                            coord: next,
                            next: next2,
                        });
                    }
                }
            };
            let (outer, inner) = if extend_vertical {
                (on_col, on_row)
            } else {
                (on_row, on_col)
            };
            match policy {
                ManhattanPolicy::Outer => coord = outer,
                ManhattanPolicy::Inner => {
                    out.push(coord);
                    out.push(inner);
                    coord = next;
                }
            }
        }

        out.push(coord);
        prev = Some(coord);
    }

    if let (Some(first), Some(last)) = (out.first().copied(), out.last()) {
        if !first.approx_eq(last, eps) {
            out.push(first);
        }
    }
    Ok(out)
}

fn manhattan_polygon(
    polygon: &Polygon,
    policy: ManhattanPolicy,
    eps: f64,
) -> Result<Polygon, GeometryError> {
    let exterior = manhattan_ring(polygon.points(), policy, eps)?;
    let holes = polygon
        .holes()
        .iter()
        .map(|hole| manhattan_ring(hole, policy.opposite(), eps))
        .collect::<Result<Vec<_>, _>>()?;
    Polygon::with_holes(exterior, holes)
}

/// Make every polygon in `shape` rectilinear.
///
/// Multi-part shapes are handled per part and unioned again. Two consecutive
/// diagonal edges give [`GeometryError::NonManhattan`].
pub fn manhattanize(
    shape: &Shape,
    policy: ManhattanPolicy,
    geom: &dyn PlanarGeometry,
    eps: f64,
) -> Result<Shape, GeometryError> {
    let mut parts = shape
        .pointsshapes()
        .map(|piece| match piece {
            Shape::Polygon(p) => manhattan_polygon(&p, policy, eps).map(Shape::Polygon),
            other => Ok(other),
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!("manhattanized {} part(s) with {policy:?} policy", parts.len());
    if parts.len() == 1 {
        if let Some(part) = parts.pop() {
            return Ok(part);
        }
    }
    geom.union_all(&parts)
        .ok_or_else(|| GeometryError::invalid("manhattanized shape is empty"))
}

/// Grow `shape` by `size` and restore rectilinearity with the outer policy.
pub fn grow(
    shape: &Shape,
    size: f64,
    geom: &dyn PlanarGeometry,
    eps: f64,
) -> Result<Shape, GeometryError> {
    let grown = geom
        .buffer(shape, size)
        .ok_or_else(|| GeometryError::invalid(format!("shape vanished growing by {size}")))?;
    manhattanize(&grown, ManhattanPolicy::Outer, geom, eps)
}

/// Convex hull of `shape` made rectilinear with the inner policy.
pub fn connect(
    shape: &Shape,
    geom: &dyn PlanarGeometry,
    eps: f64,
) -> Result<Shape, GeometryError> {
    let hull = geom
        .convex_hull(shape)
        .ok_or_else(|| GeometryError::invalid("convex hull of empty shape"))?;
    manhattanize(&hull, ManhattanPolicy::Inner, geom, eps)
}
