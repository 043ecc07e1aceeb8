use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Coordinate values closer than this are considered equal.
///
/// Coordinates are in µm, so this corresponds with 1 fm.
pub const EPSILON: f64 = 1e-6;

pub(crate) fn approx_eq(v1: f64, v2: f64, eps: f64) -> bool {
    (v1 - v2).abs() < eps
}

fn feq(v1: f64, v2: f64) -> bool {
    approx_eq(v1, v2, EPSILON)
}

// ── Rotation ─────────────────────────────────────────────────────────

/// The orientations a shape can be placed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
    /// Mirror around the y-axis (x → -x).
    MX,
    MX90,
    /// Mirror around the x-axis (y → -y).
    MY,
    MY90,
}

impl Rotation {
    pub const ALL: [Rotation; 8] = [
        Rotation::R0,
        Rotation::R90,
        Rotation::R180,
        Rotation::R270,
        Rotation::MX,
        Rotation::MX90,
        Rotation::MY,
        Rotation::MY90,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rotation::R0 => "no",
            Rotation::R90 => "90",
            Rotation::R180 => "180",
            Rotation::R270 => "270",
            Rotation::MX => "mirrorx",
            Rotation::MX90 => "mirrorx&90",
            Rotation::MY => "mirrory",
            Rotation::MY90 => "mirrory&90",
        }
    }

    /// Transform a coordinate pair around the origin.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Rotation::R0 => (x, y),
            Rotation::R90 => (-y, x),
            Rotation::R180 => (-x, -y),
            Rotation::R270 => (y, -x),
            Rotation::MX => (-x, y),
            Rotation::MX90 => (-y, -x),
            Rotation::MY => (x, -y),
            Rotation::MY90 => (y, x),
        }
    }

    /// Whether width and height are exchanged by this rotation.
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Rotation::R90 | Rotation::R270 | Rotation::MX90 | Rotation::MY90
        )
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Rotation {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rotation::ALL
            .iter()
            .copied()
            .find(|r| r.name() == s)
            .ok_or_else(|| GeometryError::invalid(format!("unknown rotation '{s}'")))
    }
}

// ── Point ────────────────────────────────────────────────────────────

/// A 2D point in layout coordinates (µm).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn moved(&self, dxy: Point) -> Self {
        Self {
            x: self.x + dxy.x,
            y: self.y + dxy.y,
        }
    }

    pub fn rotated(&self, rotation: Rotation) -> Self {
        let (x, y) = rotation.apply(self.x, self.y);
        Self { x, y }
    }

    pub fn approx_eq(&self, other: &Point, eps: f64) -> bool {
        approx_eq(self.x, other.x, eps) && approx_eq(self.y, other.y, eps)
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other, EPSILON)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        self.moved(rhs)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        self.moved(-rhs)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, m: f64) -> Point {
        Point::new(m * self.x, m * self.y)
    }
}

// ── Bounding box ─────────────────────────────────────────────────────

/// An axis-aligned bounding box; may be degenerate (a line or a point).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        })
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn moved(&self, dxy: Point) -> Self {
        Self {
            min: self.min.moved(dxy),
            max: self.max.moved(dxy),
        }
    }

    /// The box as a shape: a rectangle, or a line/point for zero-area boxes.
    pub fn to_shape(&self) -> Shape {
        let flat_x = feq(self.min.x, self.max.x);
        let flat_y = feq(self.min.y, self.max.y);
        match (flat_x, flat_y) {
            (true, true) => Shape::Point(self.min),
            (false, false) => Shape::Rect(Rect {
                left: self.min.x,
                bottom: self.min.y,
                right: self.max.x,
                top: self.max.y,
            }),
            _ => Shape::Line(Line::new(self.min, self.max)),
        }
    }
}

// ── Line ─────────────────────────────────────────────────────────────

/// A directional line; swapping the end points gives another line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub point1: Point,
    pub point2: Point,
}

impl Line {
    pub fn new(point1: Point, point2: Point) -> Self {
        Self { point1, point2 }
    }

    pub fn bounds(&self) -> BBox {
        BBox::new(
            Point::new(
                self.point1.x.min(self.point2.x),
                self.point1.y.min(self.point2.y),
            ),
            Point::new(
                self.point1.x.max(self.point2.x),
                self.point1.y.max(self.point2.y),
            ),
        )
    }

    pub fn length(&self) -> f64 {
        self.point1.distance_to(&self.point2)
    }
}

// ── Polygon ──────────────────────────────────────────────────────────

/// Signed shoelace area of a closed ring.
pub(crate) fn ring_signed_area(ring: &[Point]) -> f64 {
    0.5 * ring
        .windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum::<f64>()
}

fn check_ring(ring: &[Point]) -> Result<(), GeometryError> {
    let (Some(first), Some(last)) = (ring.first(), ring.last()) else {
        return Err(GeometryError::invalid("polygon without points"));
    };
    if first != last {
        return Err(GeometryError::invalid(
            "last point has to be the same as the first point",
        ));
    }
    if ring.len() < 4 {
        return Err(GeometryError::invalid(format!(
            "polygon ring needs at least 3 distinct points, got {}",
            ring.len() - 1
        )));
    }
    let Some(bounds) = BBox::from_points(ring) else {
        return Err(GeometryError::invalid("polygon without points"));
    };
    if feq(bounds.min.x, bounds.max.x)
        || feq(bounds.min.y, bounds.max.y)
        || ring_signed_area(ring).abs() <= EPSILON * EPSILON
    {
        return Err(GeometryError::invalid(
            "polygon with only colinear points not allowed",
        ));
    }
    Ok(())
}

/// A polygon given by a closed exterior ring and optional closed holes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawPolygon")]
pub struct Polygon {
    points: Vec<Point>,
    holes: Vec<Vec<Point>>,
}

#[derive(Deserialize)]
struct RawPolygon {
    points: Vec<Point>,
    #[serde(default)]
    holes: Vec<Vec<Point>>,
}

impl TryFrom<RawPolygon> for Polygon {
    type Error = GeometryError;

    fn try_from(raw: RawPolygon) -> Result<Self, Self::Error> {
        Self::with_holes(raw.points, raw.holes)
    }
}

impl Polygon {
    /// The ring has to be closed: the last point equals the first one.
    pub fn new(points: Vec<Point>) -> Result<Self, GeometryError> {
        Self::with_holes(points, Vec::new())
    }

    pub fn with_holes(points: Vec<Point>, holes: Vec<Vec<Point>>) -> Result<Self, GeometryError> {
        check_ring(&points)?;
        for hole in &holes {
            check_ring(hole)?;
        }
        Ok(Self { points, holes })
    }

    pub fn from_floats(points: &[(f64, f64)]) -> Result<Self, GeometryError> {
        Self::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn holes(&self) -> &[Vec<Point>] {
        &self.holes
    }

    pub fn bounds(&self) -> BBox {
        BBox::from_points(&self.points).unwrap_or(BBox::new(ORIGIN, ORIGIN))
    }

    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| ring_signed_area(h).abs()).sum();
        ring_signed_area(&self.points).abs() - holes
    }

    fn map_points(&self, f: impl Fn(&Point) -> Point) -> Self {
        Self {
            points: self.points.iter().map(&f).collect(),
            holes: self
                .holes
                .iter()
                .map(|hole| hole.iter().map(&f).collect())
                .collect(),
        }
    }

    pub fn moved(&self, dxy: Point) -> Self {
        self.map_points(|p| p.moved(dxy))
    }

    pub fn rotated(&self, rotation: Rotation) -> Self {
        self.map_points(|p| p.rotated(rotation))
    }
}

impl PartialEq for Polygon {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points && self.holes == other.holes
    }
}

// ── Rect ─────────────────────────────────────────────────────────────

/// An axis-aligned rectangle with `left < right` and `bottom < top`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawRect")]
pub struct Rect {
    left: f64,
    bottom: f64,
    right: f64,
    top: f64,
}

#[derive(Deserialize)]
struct RawRect {
    left: f64,
    bottom: f64,
    right: f64,
    top: f64,
}

impl TryFrom<RawRect> for Rect {
    type Error = GeometryError;

    fn try_from(raw: RawRect) -> Result<Self, Self::Error> {
        Self::new(raw.left, raw.bottom, raw.right, raw.top)
    }
}

impl Rect {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Result<Self, GeometryError> {
        if !(left < right && bottom < top) {
            return Err(GeometryError::invalid(format!(
                "rectangle needs left < right and bottom < top, got \
                 left={left}, bottom={bottom}, right={right}, top={top}"
            )));
        }
        Ok(Self {
            left,
            bottom,
            right,
            top,
        })
    }

    pub fn from_corners(corner1: Point, corner2: Point) -> Result<Self, GeometryError> {
        Self::new(
            corner1.x.min(corner2.x),
            corner1.y.min(corner2.y),
            corner1.x.max(corner2.x),
            corner1.y.max(corner2.y),
        )
    }

    pub fn from_size(center: Point, width: f64, height: f64) -> Result<Self, GeometryError> {
        if !(width > 0.0 && height > 0.0) {
            return Err(GeometryError::invalid(format!(
                "rectangle size has to be positive, got {width}x{height}"
            )));
        }
        Self::new(
            center.x - 0.5 * width,
            center.y - 0.5 * height,
            center.x + 0.5 * width,
            center.y + 0.5 * height,
        )
    }

    /// Copy of `rect` with the given edges replaced, then grown by `bias` on
    /// every side.
    pub fn from_rect(
        rect: &Rect,
        left: Option<f64>,
        bottom: Option<f64>,
        right: Option<f64>,
        top: Option<f64>,
        bias: f64,
    ) -> Result<Self, GeometryError> {
        Self::new(
            left.unwrap_or(rect.left) - bias,
            bottom.unwrap_or(rect.bottom) - bias,
            right.unwrap_or(rect.right) + bias,
            top.unwrap_or(rect.top) + bias,
        )
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn center(&self) -> Point {
        Point::new(0.5 * (self.left + self.right), 0.5 * (self.bottom + self.top))
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn bounds(&self) -> BBox {
        BBox::new(
            Point::new(self.left, self.bottom),
            Point::new(self.right, self.top),
        )
    }

    /// The closed ring of the rectangle.
    pub fn points(&self) -> [Point; 5] {
        [
            Point::new(self.left, self.bottom),
            Point::new(self.left, self.top),
            Point::new(self.right, self.top),
            Point::new(self.right, self.bottom),
            Point::new(self.left, self.bottom),
        ]
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        self.bounds().contains_point(p)
    }

    pub fn moved(&self, dxy: Point) -> Self {
        Self {
            left: self.left + dxy.x,
            bottom: self.bottom + dxy.y,
            right: self.right + dxy.x,
            top: self.top + dxy.y,
        }
    }

    pub fn rotated(&self, rotation: Rotation) -> Self {
        let (width, height) = if rotation.swaps_axes() {
            (self.height(), self.width())
        } else {
            (self.width(), self.height())
        };
        let c = self.center().rotated(rotation);
        Self {
            left: c.x - 0.5 * width,
            bottom: c.y - 0.5 * height,
            right: c.x + 0.5 * width,
            top: c.y + 0.5 * height,
        }
    }
}

impl PartialEq for Rect {
    fn eq(&self, other: &Self) -> bool {
        feq(self.left, other.left)
            && feq(self.bottom, other.bottom)
            && feq(self.right, other.right)
            && feq(self.top, other.top)
    }
}

// ── MultiShape ───────────────────────────────────────────────────────

/// A group of non-overlapping shapes; member order is irrelevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawMultiShape")]
pub struct MultiShape {
    shapes: Vec<Shape>,
}

#[derive(Deserialize)]
struct RawMultiShape {
    shapes: Vec<Shape>,
}

impl TryFrom<RawMultiShape> for MultiShape {
    type Error = GeometryError;

    fn try_from(raw: RawMultiShape) -> Result<Self, Self::Error> {
        Self::new(raw.shapes)
    }
}

impl MultiShape {
    /// Nested multi-shapes are flattened into this one.
    pub fn new(shapes: impl IntoIterator<Item = Shape>) -> Result<Self, GeometryError> {
        let mut flat = Vec::new();
        for shape in shapes {
            match shape {
                Shape::Multi(multi) => flat.extend(multi.shapes),
                other => flat.push(other),
            }
        }
        if flat.len() < 2 {
            return Err(GeometryError::invalid(
                "MultiShape has to consist of more than one shape",
            ));
        }
        Ok(Self { shapes: flat })
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn contains(&self, shape: &Shape) -> bool {
        self.shapes.iter().any(|s| s == shape)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter()
    }

    pub fn bounds(&self) -> BBox {
        let mut shapes = self.shapes.iter();
        let first = shapes.next().map(Shape::bounds);
        shapes
            .fold(first, |acc, s| acc.map(|b| b.union(&s.bounds())))
            .unwrap_or(BBox::new(ORIGIN, ORIGIN))
    }

    /// Sum of the member areas; members are assumed not to overlap.
    pub fn area(&self) -> f64 {
        self.shapes.iter().map(Shape::area).sum()
    }

    pub fn moved(&self, dxy: Point) -> Self {
        Self {
            shapes: self.shapes.iter().map(|s| s.moved(dxy)).collect(),
        }
    }

    pub fn rotated(&self, rotation: Rotation) -> Self {
        Self {
            shapes: self.shapes.iter().map(|s| s.rotated(rotation)).collect(),
        }
    }
}

impl PartialEq for MultiShape {
    fn eq(&self, other: &Self) -> bool {
        if self.shapes.len() != other.shapes.len() {
            return false;
        }
        let mut used = vec![false; other.shapes.len()];
        self.shapes.iter().all(|shape| {
            let found = other
                .shapes
                .iter()
                .enumerate()
                .position(|(i, o)| !used[i] && o == shape);
            match found {
                Some(i) => {
                    used[i] = true;
                    true
                }
                None => false,
            }
        })
    }
}

// ── RepeatedShape ────────────────────────────────────────────────────

/// One shape tiled `n` times along `n_dxy` and optionally `m` times along
/// `m_dxy`. Tiles are assumed not to overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRepeatedShape")]
pub struct RepeatedShape {
    shape: Box<Shape>,
    offset0: Point,
    n: usize,
    n_dxy: Point,
    m: usize,
    m_dxy: Option<Point>,
}

#[derive(Deserialize)]
struct RawRepeatedShape {
    shape: Box<Shape>,
    offset0: Point,
    n: usize,
    n_dxy: Point,
    m: usize,
    m_dxy: Option<Point>,
}

impl TryFrom<RawRepeatedShape> for RepeatedShape {
    type Error = GeometryError;

    fn try_from(raw: RawRepeatedShape) -> Result<Self, Self::Error> {
        Self::new(*raw.shape, raw.offset0, raw.n, raw.n_dxy, raw.m, raw.m_dxy)
    }
}

impl RepeatedShape {
    pub fn new(
        shape: Shape,
        offset0: Point,
        n: usize,
        n_dxy: Point,
        m: usize,
        m_dxy: Option<Point>,
    ) -> Result<Self, GeometryError> {
        if n < 2 {
            return Err(GeometryError::invalid(format!(
                "n has to be equal to or higher than 2, not '{n}'"
            )));
        }
        if m < 1 {
            return Err(GeometryError::invalid(format!(
                "m has to be equal to or higher than 1, not '{m}'"
            )));
        }
        if m > 1 && m_dxy.is_none() {
            return Err(GeometryError::invalid("m_dxy may not be None if m > 1"));
        }
        Ok(Self {
            shape: Box::new(shape),
            offset0,
            n,
            n_dxy,
            m,
            m_dxy,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn offset0(&self) -> Point {
        self.offset0
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn n_dxy(&self) -> Point {
        self.n_dxy
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn m_dxy(&self) -> Option<Point> {
        self.m_dxy
    }

    /// Offsets of all tiles, `n` varying slowest.
    pub fn offsets(&self) -> impl Iterator<Item = Point> + '_ {
        let m_dxy = self.m_dxy.unwrap_or(ORIGIN);
        (0..self.n).flat_map(move |i_n| {
            (0..self.m).map(move |i_m| self.offset0 + self.n_dxy * i_n as f64 + m_dxy * i_m as f64)
        })
    }

    pub fn bounds(&self) -> BBox {
        let base = self.shape.bounds();
        let last_n = self.n_dxy * (self.n - 1) as f64;
        let last_m = self.m_dxy.unwrap_or(ORIGIN) * (self.m - 1) as f64;
        [ORIGIN, last_n, last_m, last_n + last_m]
            .iter()
            .map(|&d| base.moved(self.offset0 + d))
            .reduce(|acc, b| acc.union(&b))
            .unwrap_or(base)
    }

    pub fn area(&self) -> f64 {
        (self.n * self.m) as f64 * self.shape.area()
    }

    pub fn moved(&self, dxy: Point) -> Self {
        Self {
            offset0: self.offset0.moved(dxy),
            ..self.clone()
        }
    }

    pub fn rotated(&self, rotation: Rotation) -> Self {
        Self {
            shape: Box::new(self.shape.rotated(rotation)),
            offset0: self.offset0.rotated(rotation),
            n: self.n,
            n_dxy: self.n_dxy.rotated(rotation),
            m: self.m,
            m_dxy: self.m_dxy.map(|d| d.rotated(rotation)),
        }
    }
}

impl PartialEq for RepeatedShape {
    fn eq(&self, o: &Self) -> bool {
        if self.shape != o.shape || self.offset0 != o.offset0 {
            return false;
        }
        if self.m == 1 {
            return o.m == 1 && self.n == o.n && self.n_dxy == o.n_dxy;
        }
        let same = self.n == o.n && self.n_dxy == o.n_dxy && self.m == o.m && self.m_dxy == o.m_dxy;
        let swapped = self.n == o.m
            && Some(self.n_dxy) == o.m_dxy
            && self.m == o.n
            && self.m_dxy == Some(o.n_dxy);
        same || swapped
    }
}

// ── Shape ────────────────────────────────────────────────────────────

/// An immutable shape drawn on a mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Shape {
    Point(Point),
    Line(Line),
    Polygon(Polygon),
    Rect(Rect),
    Multi(MultiShape),
    Repeated(RepeatedShape),
}

impl Shape {
    pub fn moved(&self, dxy: Point) -> Shape {
        match self {
            Shape::Point(p) => Shape::Point(p.moved(dxy)),
            Shape::Line(l) => Shape::Line(Line::new(l.point1.moved(dxy), l.point2.moved(dxy))),
            Shape::Polygon(p) => Shape::Polygon(p.moved(dxy)),
            Shape::Rect(r) => Shape::Rect(r.moved(dxy)),
            Shape::Multi(m) => Shape::Multi(m.moved(dxy)),
            Shape::Repeated(r) => Shape::Repeated(r.moved(dxy)),
        }
    }

    pub fn rotated(&self, rotation: Rotation) -> Shape {
        match self {
            Shape::Point(p) => Shape::Point(p.rotated(rotation)),
            Shape::Line(l) => Shape::Line(Line::new(
                l.point1.rotated(rotation),
                l.point2.rotated(rotation),
            )),
            Shape::Polygon(p) => Shape::Polygon(p.rotated(rotation)),
            Shape::Rect(r) => Shape::Rect(r.rotated(rotation)),
            Shape::Multi(m) => Shape::Multi(m.rotated(rotation)),
            Shape::Repeated(r) => Shape::Repeated(r.rotated(rotation)),
        }
    }

    /// Smallest enclosing box; see [`BBox::to_shape`] for the degenerate forms.
    pub fn bounds(&self) -> BBox {
        match self {
            Shape::Point(p) => BBox::new(*p, *p),
            Shape::Line(l) => l.bounds(),
            Shape::Polygon(p) => p.bounds(),
            Shape::Rect(r) => r.bounds(),
            Shape::Multi(m) => m.bounds(),
            Shape::Repeated(r) => r.bounds(),
        }
    }

    pub fn area(&self) -> f64 {
        match self {
            Shape::Point(_) | Shape::Line(_) => 0.0,
            Shape::Polygon(p) => p.area(),
            Shape::Rect(r) => r.area(),
            Shape::Multi(m) => m.area(),
            Shape::Repeated(r) => r.area(),
        }
    }

    /// Decompose into points, lines, polygons and rectangles.
    ///
    /// The iterator is lazy; calling this again restarts the decomposition.
    pub fn pointsshapes(&self) -> Box<dyn Iterator<Item = Shape> + '_> {
        match self {
            Shape::Point(_) | Shape::Line(_) | Shape::Polygon(_) | Shape::Rect(_) => {
                Box::new(std::iter::once(self.clone()))
            }
            Shape::Multi(m) => Box::new(m.shapes.iter().flat_map(|s| s.pointsshapes())),
            Shape::Repeated(r) => Box::new(
                r.offsets()
                    .flat_map(move |dxy| r.shape.pointsshapes().map(move |s| s.moved(dxy))),
            ),
        }
    }

    pub fn repeat(
        self,
        offset0: Point,
        n: usize,
        n_dxy: Point,
        m: usize,
        m_dxy: Option<Point>,
    ) -> Result<RepeatedShape, GeometryError> {
        RepeatedShape::new(self, offset0, n, n_dxy, m, m_dxy)
    }
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Shape::Point(a), Shape::Point(b)) => a == b,
            (Shape::Line(a), Shape::Line(b)) => a == b,
            (Shape::Polygon(a), Shape::Polygon(b)) => a == b,
            (Shape::Rect(a), Shape::Rect(b)) => a == b,
            (Shape::Multi(a), Shape::Multi(b)) => a == b,
            (Shape::Repeated(a), Shape::Repeated(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Point> for Shape {
    fn from(p: Point) -> Self {
        Shape::Point(p)
    }
}

impl From<Line> for Shape {
    fn from(l: Line) -> Self {
        Shape::Line(l)
    }
}

impl From<Polygon> for Shape {
    fn from(p: Polygon) -> Self {
        Shape::Polygon(p)
    }
}

impl From<Rect> for Shape {
    fn from(r: Rect) -> Self {
        Shape::Rect(r)
    }
}

impl From<MultiShape> for Shape {
    fn from(m: MultiShape) -> Self {
        Shape::Multi(m)
    }
}

impl From<RepeatedShape> for Shape {
    fn from(r: RepeatedShape) -> Self {
        Shape::Repeated(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rect(l: f64, b: f64, r: f64, t: f64) -> Rect {
        Rect::new(l, b, r, t).unwrap()
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_abs_diff_eq!(a.distance_to(&b), 5.0, epsilon = 1e-10);
    }

    #[test]
    fn test_point_tolerant_equality() {
        assert_eq!(Point::new(1.0, 2.0), Point::new(1.0 + 1e-7, 2.0 - 1e-7));
        assert_ne!(Point::new(1.0, 2.0), Point::new(1.0 + 1e-5, 2.0));
    }

    #[test]
    fn test_rotation_names() {
        for rot in Rotation::ALL {
            assert_eq!(rot.to_string().parse::<Rotation>().unwrap(), rot);
        }
        assert_eq!("mirrorx&90".parse::<Rotation>().unwrap(), Rotation::MX90);
        assert!("45".parse::<Rotation>().is_err());
    }

    #[test]
    fn test_point_rotation_table() {
        let p = Point::new(1.0, 2.0);
        assert_eq!(p.rotated(Rotation::R90), Point::new(-2.0, 1.0));
        assert_eq!(p.rotated(Rotation::R270), Point::new(2.0, -1.0));
        assert_eq!(p.rotated(Rotation::MX), Point::new(-1.0, 2.0));
        assert_eq!(p.rotated(Rotation::MX90), Point::new(-2.0, -1.0));
        assert_eq!(p.rotated(Rotation::MY), Point::new(1.0, -2.0));
        assert_eq!(p.rotated(Rotation::MY90), Point::new(2.0, 1.0));
    }

    #[test]
    fn test_rotate_twice_90_is_180() {
        let shapes: Vec<Shape> = vec![
            Point::new(1.0, -2.0).into(),
            Line::new(Point::new(0.0, 0.0), Point::new(1.0, 3.0)).into(),
            rect(1.0, 2.0, 4.0, 3.0).into(),
            Polygon::from_floats(&[(0.0, 0.0), (2.0, 0.0), (0.0, 1.0), (0.0, 0.0)])
                .unwrap()
                .into(),
        ];
        for shape in shapes {
            assert_eq!(
                shape.rotated(Rotation::R90).rotated(Rotation::R90),
                shape.rotated(Rotation::R180)
            );
        }
    }

    #[test]
    fn test_move_there_and_back() {
        let v = Point::new(0.3, -7.1);
        let multi = MultiShape::new(vec![
            Shape::from(rect(0.0, 0.0, 1.0, 1.0)),
            Shape::from(Point::new(5.0, 5.0)),
        ])
        .unwrap();
        let shape = Shape::from(multi);
        assert_eq!(shape.moved(v).moved(-v), shape);
    }

    #[test]
    fn test_rect_validation() {
        assert!(Rect::new(0.0, 0.0, 0.0, 1.0).is_err());
        assert!(Rect::new(1.0, 0.0, 0.0, 1.0).is_err());
        assert!(Rect::from_size(ORIGIN, -1.0, 1.0).is_err());
        let r = Rect::from_corners(Point::new(2.0, 3.0), Point::new(0.0, 1.0)).unwrap();
        assert_eq!(r, rect(0.0, 1.0, 2.0, 3.0));
        assert_abs_diff_eq!(r.area(), 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rect_from_rect_bias() {
        let r = rect(0.0, 0.0, 2.0, 1.0);
        let grown = Rect::from_rect(&r, None, None, Some(3.0), None, 0.5).unwrap();
        assert_eq!(grown, rect(-0.5, -0.5, 3.5, 1.5));
    }

    #[test]
    fn test_rect_rotation_swaps_dimensions() {
        let r = rect(1.0, 0.0, 4.0, 1.0);
        let rotated = r.rotated(Rotation::R90);
        assert_eq!(rotated, rect(-1.0, 1.0, 0.0, 4.0));
        assert_abs_diff_eq!(rotated.area(), r.area(), epsilon = 1e-10);
    }

    #[test]
    fn test_polygon_validation() {
        // open ring
        assert!(Polygon::from_floats(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]).is_err());
        // colinear
        assert!(Polygon::from_floats(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.0, 0.0)]).is_err());
        assert!(Polygon::from_floats(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]).is_err());
        let triangle =
            Polygon::from_floats(&[(0.0, 0.0), (2.0, 0.0), (0.0, 2.0), (0.0, 0.0)]).unwrap();
        assert_abs_diff_eq!(triangle.area(), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_polygon_with_hole_area() {
        let outer = rect(0.0, 0.0, 4.0, 4.0).points().to_vec();
        let hole = rect(1.0, 1.0, 2.0, 2.0).points().to_vec();
        let p = Polygon::with_holes(outer, vec![hole]).unwrap();
        assert_abs_diff_eq!(p.area(), 15.0, epsilon = 1e-10);
    }

    #[test]
    fn test_bounds_degenerate_forms() {
        let p = Point::new(1.0, 1.0);
        let p2 = Point::new(1.0, 5.0);
        assert_eq!(Shape::from(p).bounds().to_shape(), Shape::Point(p));
        let multi = MultiShape::new(vec![Shape::from(p), Shape::from(p2)]).unwrap();
        assert_eq!(
            Shape::from(multi).bounds().to_shape(),
            Shape::Line(Line::new(p, p2))
        );
    }

    #[test]
    fn test_multishape() {
        let p = Shape::from(Point::new(1.0, -1.0));
        let l = Shape::from(Line::new(ORIGIN, Point::new(1.0, 1.0)));
        let r = Shape::from(rect(-2.0, -3.0, 2.0, -2.0));

        assert!(MultiShape::new(vec![p.clone()]).is_err());

        let ms1 = MultiShape::new(vec![p.clone(), l.clone(), r.clone()]).unwrap();
        let ms2 = MultiShape::new(vec![l.clone(), r.clone(), p.clone()]).unwrap();
        let nested = MultiShape::new(vec![r.clone(), p.clone()]).unwrap();
        let ms3 = MultiShape::new(vec![l.clone(), Shape::from(nested)]).unwrap();
        let ms4 = MultiShape::new(vec![p.clone(), l.clone()]).unwrap();

        assert_eq!(ms1, ms2);
        assert_eq!(ms1, ms3);
        assert_ne!(ms1, ms4);
        assert_eq!(ms1.len(), 3);
        assert!(ms2.contains(&l));
        assert_abs_diff_eq!(ms1.area(), 4.0, epsilon = 1e-6);
        assert_eq!(
            Shape::from(ms1).bounds().to_shape(),
            Shape::from(rect(-2.0, -3.0, 2.0, 1.0))
        );
    }

    #[test]
    fn test_repeatedshape_validation() {
        let s = Shape::from(Rect::from_size(ORIGIN, 2.0, 2.0).unwrap());
        let dxy = Point::new(5.0, 0.0);
        assert!(RepeatedShape::new(s.clone(), ORIGIN, 1, dxy, 1, None).is_err());
        assert!(RepeatedShape::new(s.clone(), ORIGIN, 2, dxy, 0, None).is_err());
        assert!(RepeatedShape::new(s, ORIGIN, 2, dxy, 2, None).is_err());
    }

    #[test]
    fn test_repeatedshape() {
        let s = Shape::from(Rect::from_size(ORIGIN, 2.0, 2.0).unwrap());
        let dxy1 = Point::new(5.0, 0.0);
        let dxy2 = Point::new(0.0, 5.0);
        let p = Point::new(0.0, 1.0);

        let rp1 = RepeatedShape::new(s.clone(), ORIGIN, 2, dxy1, 1, None).unwrap();
        let rp2 = s.clone().repeat(ORIGIN, 2, dxy1, 1, None).unwrap();
        let rp3 = RepeatedShape::new(s.clone(), p, 2, dxy1, 1, None).unwrap();
        let rp4 = RepeatedShape::new(s.clone(), ORIGIN, 2, dxy1, 2, Some(dxy2)).unwrap();
        let rp5 = RepeatedShape::new(s.clone(), ORIGIN, 2, dxy2, 2, Some(dxy1)).unwrap();
        let rp6 = RepeatedShape::new(s.clone(), ORIGIN, 2, dxy1, 3, Some(dxy2)).unwrap();
        let rp7 = RepeatedShape::new(s.clone(), ORIGIN, 3, dxy2, 2, Some(dxy1)).unwrap();
        let rp8 = RepeatedShape::new(s.clone(), ORIGIN, 2, dxy2, 3, Some(dxy1)).unwrap();

        assert_abs_diff_eq!(rp1.area(), 2.0 * s.area(), epsilon = 1e-6);
        assert_eq!(rp1, rp2);
        assert_ne!(rp1, rp3);
        assert_eq!(rp1.moved(p), rp3);
        assert_ne!(rp1, rp4);
        assert_eq!(rp4, rp5);
        assert_eq!(rp6, rp7);
        assert_ne!(rp6, rp8);

        let tiled = Shape::from(rp4.clone());
        let tiles = MultiShape::new(tiled.pointsshapes().collect::<Vec<_>>()).unwrap();
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles.bounds(), rp4.bounds());
        assert!(tiles.contains(&s.moved(dxy1 + dxy2)));
    }

    #[test]
    fn test_pointsshapes_restartable() {
        let s = Shape::from(rect(0.0, 0.0, 1.0, 1.0));
        let rp = Shape::from(s.repeat(ORIGIN, 3, Point::new(2.0, 0.0), 1, None).unwrap());
        assert_eq!(rp.pointsshapes().count(), 3);
        assert_eq!(rp.pointsshapes().count(), 3);
        let last = rp.pointsshapes().last().unwrap();
        assert_eq!(last, Shape::from(rect(4.0, 0.0, 5.0, 1.0)));
    }

    #[test]
    fn test_repeatedshape_rotation() {
        let s = Shape::from(rect(0.0, 0.0, 1.0, 1.0));
        let rp = Shape::from(s.repeat(ORIGIN, 2, Point::new(3.0, 0.0), 1, None).unwrap());
        let rot = Rotation::MY90;
        let rotated = rp.rotated(rot);
        let direct = MultiShape::new(rotated.pointsshapes().collect::<Vec<_>>()).unwrap();
        let via_members =
            MultiShape::new(rp.pointsshapes().map(|s| s.rotated(rot)).collect::<Vec<_>>()).unwrap();
        assert_eq!(direct, via_members);
    }

    #[test]
    fn test_deserialize_validates() {
        let r: Rect = serde_json::from_str(r#"{"left":0,"bottom":0,"right":1,"top":2}"#).unwrap();
        assert_eq!(r, rect(0.0, 0.0, 1.0, 2.0));
        assert!(serde_json::from_str::<Rect>(r#"{"left":1,"bottom":0,"right":0,"top":2}"#).is_err());

        let open_ring = r#"{"points":[{"x":0,"y":0},{"x":1,"y":0},{"x":1,"y":1}],"holes":[]}"#;
        assert!(serde_json::from_str::<Polygon>(open_ring).is_err());

        let single = r#"{"shapes":[{"Point":{"x":0,"y":0}}]}"#;
        assert!(serde_json::from_str::<MultiShape>(single).is_err());

        let tile = r#"{"Rect":{"left":0,"bottom":0,"right":1,"top":1}}"#;
        let repeated = |n: usize, m: usize| {
            format!(
                r#"{{"shape":{tile},"offset0":{{"x":0,"y":0}},"n":{n},"n_dxy":{{"x":2,"y":0}},"m":{m},"m_dxy":null}}"#
            )
        };
        let ok: RepeatedShape = serde_json::from_str(&repeated(2, 1)).unwrap();
        assert_eq!(Shape::from(ok).pointsshapes().count(), 2);
        assert!(serde_json::from_str::<RepeatedShape>(&repeated(2, 0)).is_err());
        assert!(serde_json::from_str::<RepeatedShape>(&repeated(1, 1)).is_err());
        assert!(serde_json::from_str::<RepeatedShape>(&repeated(2, 2)).is_err());

        let shape: Result<Shape, _> =
            serde_json::from_str(r#"{"Rect":{"left":0,"bottom":3,"right":1,"top":2}}"#);
        assert!(shape.is_err());
    }
}
