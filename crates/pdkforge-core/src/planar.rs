//! Planar boolean geometry behind a small trait.
//!
//! The layout code only needs a handful of region operations. They are
//! expressed by [`PlanarGeometry`]; [`GeoPlanar`] implements them on top of
//! the `geo` crate. Results always come back as kernel shapes, with `None`
//! standing for empty geometry.

use std::fmt;

use geo::algorithm::buffer::{Buffer, BufferStyle, LineJoin};
use geo::{
    unary_union, BooleanOps, ConvexHull, Coord, Geometry, Intersects, LineString, MultiPoint,
    MultiPolygon,
};

use crate::geometry::{
    approx_eq, ring_signed_area, BBox, Line, MultiShape, Point, Polygon, Rect, Shape, EPSILON,
};

/// Region operations on kernel shapes.
///
/// Implementations must be pure functions of their inputs.
pub trait PlanarGeometry: Send + Sync + fmt::Debug {
    fn union(&self, a: &Shape, b: &Shape) -> Option<Shape>;

    fn intersects(&self, a: &Shape, b: &Shape) -> bool;

    fn intersection(&self, a: &Shape, b: &Shape) -> Option<Shape>;

    fn difference(&self, a: &Shape, b: &Shape) -> Option<Shape>;

    /// Grow `shape` by `distance` on all sides.
    ///
    /// Rectangles come back exactly mitred. Convex polygon corners may come
    /// back bevelled; `manhattan::grow` squares them again.
    fn buffer(&self, shape: &Shape, distance: f64) -> Option<Shape>;

    fn convex_hull(&self, shape: &Shape) -> Option<Shape>;

    fn union_all(&self, shapes: &[Shape]) -> Option<Shape> {
        shapes.iter().fold(None, |acc, shape| match acc {
            None => Some(shape.clone()),
            Some(acc) => self.union(&acc, shape),
        })
    }
}

/// Miter setting handed to `geo`; it may still bevel sharp corners.
const MITER_LIMIT: f64 = 10.0;

/// [`PlanarGeometry`] on top of the `geo` crate.
#[derive(Debug, Clone, Copy)]
pub struct GeoPlanar {
    eps: f64,
}

impl Default for GeoPlanar {
    fn default() -> Self {
        Self { eps: EPSILON }
    }
}

/// A shape split into its area part and its zero-area points and lines.
struct Split {
    areal: Vec<geo::Polygon<f64>>,
    other: Vec<Shape>,
}

impl GeoPlanar {
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }

    fn split(&self, shape: &Shape) -> Split {
        let mut split = Split {
            areal: Vec::new(),
            other: Vec::new(),
        };
        for piece in shape.pointsshapes() {
            match &piece {
                Shape::Rect(r) => split.areal.push(rect_to_geo(r)),
                Shape::Polygon(p) => split.areal.push(polygon_to_geo(p)),
                _ => split.other.push(piece),
            }
        }
        split
    }

    fn areal(&self, shape: &Shape) -> (MultiPolygon<f64>, Vec<Shape>) {
        let split = self.split(shape);
        (unary_union(&split.areal), split.other)
    }

    fn to_shape(&self, mp: &MultiPolygon<f64>, mut extra: Vec<Shape>) -> Option<Shape> {
        let mut parts: Vec<Shape> = mp
            .0
            .iter()
            .filter_map(|p| from_geo_polygon(p, self.eps))
            .collect();
        parts.append(&mut extra);
        from_parts(parts)
    }
}

impl PlanarGeometry for GeoPlanar {
    fn union(&self, a: &Shape, b: &Shape) -> Option<Shape> {
        let (mp_a, mut other) = self.areal(a);
        let (mp_b, mut other_b) = self.areal(b);
        other.append(&mut other_b);
        let merged = mp_a.union(&mp_b);

        // Points and lines touching area are absorbed by it.
        let merged_geo = Geometry::MultiPolygon(merged.clone());
        let mut kept: Vec<Shape> = Vec::new();
        for shape in other {
            if !to_geometry(&shape).is_some_and(|g| g.intersects(&merged_geo))
                && !kept.contains(&shape)
            {
                kept.push(shape);
            }
        }
        self.to_shape(&merged, kept)
    }

    fn intersects(&self, a: &Shape, b: &Shape) -> bool {
        if !a.bounds().intersects(&b.bounds()) {
            return false;
        }
        let b_pieces: Vec<(BBox, Geometry<f64>)> = b
            .pointsshapes()
            .filter_map(|s| to_geometry(&s).map(|g| (s.bounds(), g)))
            .collect();
        a.pointsshapes().any(|piece| {
            let bounds = piece.bounds();
            let Some(geom) = to_geometry(&piece) else {
                return false;
            };
            b_pieces
                .iter()
                .any(|(b_bounds, b_geom)| bounds.intersects(b_bounds) && geom.intersects(b_geom))
        })
    }

    fn intersection(&self, a: &Shape, b: &Shape) -> Option<Shape> {
        let (mp_a, other) = self.areal(a);
        let (mp_b, _) = self.areal(b);
        let kept = other
            .into_iter()
            .filter(|s| self.intersects(s, b))
            .collect();
        self.to_shape(&mp_a.intersection(&mp_b), kept)
    }

    fn difference(&self, a: &Shape, b: &Shape) -> Option<Shape> {
        let (mp_a, other) = self.areal(a);
        let (mp_b, _) = self.areal(b);
        let kept = other
            .into_iter()
            .filter(|s| !self.intersects(s, b))
            .collect();
        self.to_shape(&mp_a.difference(&mp_b), kept)
    }

    fn buffer(&self, shape: &Shape, distance: f64) -> Option<Shape> {
        let mut grown: Vec<geo::Polygon<f64>> = Vec::new();
        for piece in shape.pointsshapes() {
            match &piece {
                Shape::Polygon(p) => {
                    let style = BufferStyle::new(distance).line_join(LineJoin::Miter(MITER_LIMIT));
                    grown.extend(polygon_to_geo(p).buffer_with_style(style).0);
                }
                // Rectangles, lines and points grow into their expanded bounding box.
                other => {
                    let bb = other.bounds();
                    let rect = Rect::new(
                        bb.min.x - distance,
                        bb.min.y - distance,
                        bb.max.x + distance,
                        bb.max.y + distance,
                    );
                    if let Ok(rect) = rect {
                        grown.push(rect_to_geo(&rect));
                    }
                }
            }
        }
        self.to_shape(&unary_union(&grown), Vec::new())
    }

    fn convex_hull(&self, shape: &Shape) -> Option<Shape> {
        let mut coords: Vec<Coord<f64>> = Vec::new();
        for piece in shape.pointsshapes() {
            match piece {
                Shape::Point(p) => coords.push(to_coord(&p)),
                Shape::Line(l) => {
                    coords.push(to_coord(&l.point1));
                    coords.push(to_coord(&l.point2));
                }
                Shape::Rect(r) => coords.extend(r.points().iter().map(to_coord)),
                Shape::Polygon(p) => coords.extend(p.points().iter().map(to_coord)),
                Shape::Multi(_) | Shape::Repeated(_) => {}
            }
        }
        if coords.is_empty() {
            return None;
        }
        let hull = MultiPoint::from(coords).convex_hull();
        if let Some(shape) = from_geo_polygon(&hull, self.eps) {
            return Some(shape);
        }

        // Degenerate hull: all input points are on one line.
        let mut pts: Vec<Point> = Vec::new();
        for c in hull.exterior().coords() {
            let p = Point::new(c.x, c.y);
            if !pts.iter().any(|q| q.approx_eq(&p, self.eps)) {
                pts.push(p);
            }
        }
        match pts.as_slice() {
            [] => None,
            [p] => Some(Shape::Point(*p)),
            [first, rest @ ..] => {
                let far = rest.iter().copied().fold(*first, |far, p| {
                    if first.distance_to(&p) > first.distance_to(&far) {
                        p
                    } else {
                        far
                    }
                });
                Some(Shape::Line(Line::new(*first, far)))
            }
        }
    }
}

fn to_coord(p: &Point) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

fn ring_to_geo(points: &[Point]) -> LineString<f64> {
    LineString::from(points.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>())
}

fn rect_to_geo(r: &Rect) -> geo::Polygon<f64> {
    geo::Polygon::new(ring_to_geo(&r.points()), Vec::new())
}

fn polygon_to_geo(p: &Polygon) -> geo::Polygon<f64> {
    geo::Polygon::new(
        ring_to_geo(p.points()),
        p.holes().iter().map(|h| ring_to_geo(h)).collect(),
    )
}

fn to_geometry(shape: &Shape) -> Option<Geometry<f64>> {
    match shape {
        Shape::Point(p) => Some(Geometry::Point(geo::Point::new(p.x, p.y))),
        Shape::Line(l) => Some(Geometry::Line(geo::Line::new(
            to_coord(&l.point1),
            to_coord(&l.point2),
        ))),
        Shape::Rect(r) => Some(Geometry::Polygon(rect_to_geo(r))),
        Shape::Polygon(p) => Some(Geometry::Polygon(polygon_to_geo(p))),
        Shape::Multi(_) | Shape::Repeated(_) => None,
    }
}

fn from_parts(mut parts: Vec<Shape>) -> Option<Shape> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => MultiShape::new(parts).ok().map(Shape::Multi),
    }
}

/// Ring without duplicate, collinear or spike vertices, closed again.
///
/// Returns `None` when less than three corners remain.
fn clean_ring(ring: &LineString<f64>, eps: f64) -> Option<Vec<Point>> {
    let mut pts: Vec<Point> = ring.coords().map(|c| Point::new(c.x, c.y)).collect();
    while pts.len() > 1 && pts[0].approx_eq(&pts[pts.len() - 1], eps) {
        pts.pop();
    }
    loop {
        let before = pts.len();
        let mut i = 0;
        while pts.len() >= 3 && i < pts.len() {
            let n = pts.len();
            let prev = pts[(i + n - 1) % n];
            let cur = pts[i];
            let next = pts[(i + 1) % n];
            let cross = (cur.x - prev.x) * (next.y - prev.y) - (cur.y - prev.y) * (next.x - prev.x);
            if cur.approx_eq(&prev, eps) || cross.abs() <= eps * prev.distance_to(&next).max(eps) {
                pts.remove(i);
            } else {
                i += 1;
            }
        }
        if pts.len() == before {
            break;
        }
    }
    if pts.len() < 3 {
        return None;
    }
    pts.push(pts[0]);
    (ring_signed_area(&pts).abs() > eps * eps).then_some(pts)
}

/// A closed four-corner ring with axis-parallel edges.
fn as_rect(ring: &[Point], eps: f64) -> Option<Rect> {
    if ring.len() != 5 {
        return None;
    }
    let axis_parallel = ring
        .windows(2)
        .all(|w| approx_eq(w[0].x, w[1].x, eps) || approx_eq(w[0].y, w[1].y, eps));
    if !axis_parallel {
        return None;
    }
    let bb = BBox::from_points(ring)?;
    Rect::new(bb.min.x, bb.min.y, bb.max.x, bb.max.y).ok()
}

fn from_geo_polygon(polygon: &geo::Polygon<f64>, eps: f64) -> Option<Shape> {
    let exterior = clean_ring(polygon.exterior(), eps)?;
    let holes: Vec<Vec<Point>> = polygon
        .interiors()
        .iter()
        .filter_map(|h| clean_ring(h, eps))
        .collect();
    if holes.is_empty() {
        if let Some(rect) = as_rect(&exterior, eps) {
            return Some(Shape::Rect(rect));
        }
    }
    Polygon::with_holes(exterior, holes).ok().map(Shape::Polygon)
}
