//! Points, sizes, rectangles and 2D affine transforms
//!
//! Document geometry is kept in `f64`. Conversion to the `f32` world of the
//! raster backend happens at the backend boundary only.

use std::ops::Mul;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Point / Size
// ─────────────────────────────────────────────────────────────────────────────

/// A 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rect
// ─────────────────────────────────────────────────────────────────────────────

/// An axis-aligned rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// Rectangle spanning two corners, in any order
    pub fn from_points(a: Point, b: Point) -> Self {
        let x0 = a.x.min(b.x);
        let y0 = a.y.min(b.y);
        Self::new(x0, y0, a.x.max(b.x) - x0, a.y.max(b.y) - y0)
    }

    /// Rectangle from min/max extents
    pub fn from_extents(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn x(&self) -> f64 {
        self.origin.x
    }

    pub fn y(&self) -> f64 {
        self.origin.y
    }

    pub fn width(&self) -> f64 {
        self.size.width
    }

    pub fn height(&self) -> f64 {
        self.size.height
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    pub fn min(&self) -> Point {
        self.origin
    }

    pub fn max(&self) -> Point {
        Point::new(self.max_x(), self.max_y())
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.origin,
            Point::new(self.max_x(), self.min_y()),
            self.max(),
            Point::new(self.min_x(), self.max_y()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x()
            && point.x <= self.max_x()
            && point.y >= self.min_y()
            && point.y <= self.max_y()
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_extents(
            self.min_x().min(other.min_x()),
            self.min_y().min(other.min_y()),
            self.max_x().max(other.max_x()),
            self.max_y().max(other.max_y()),
        )
    }

    /// Overlap of both, `None` when they don't touch
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.min_x().max(other.min_x());
        let y0 = self.min_y().max(other.min_y());
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        (x0 <= x1 && y0 <= y1).then(|| Rect::from_extents(x0, y0, x1, y1))
    }

    /// Grow by `dx`/`dy` on each side (negative shrinks)
    pub fn expand(&self, dx: f64, dy: f64) -> Rect {
        Rect::from_extents(
            self.min_x() - dx,
            self.min_y() - dy,
            self.max_x() + dx,
            self.max_y() + dy,
        )
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.origin.x + dx, self.origin.y + dy, self.width(), self.height())
    }

    /// Bounding box of this rectangle after `transform`
    pub fn transform(&self, transform: &Affine) -> Rect {
        let pts = self.corners().map(|p| transform.transform_point(p));
        let mut x0 = pts[0].x;
        let mut y0 = pts[0].y;
        let mut x1 = pts[0].x;
        let mut y1 = pts[0].y;
        for p in &pts[1..] {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Rect::from_extents(x0, y0, x1, y1)
    }
}

/// Union of optional rectangles
pub fn union_opt(a: Option<Rect>, b: Option<Rect>) -> Option<Rect> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, None) => a,
        (None, b) => b,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Affine
// ─────────────────────────────────────────────────────────────────────────────

/// 2D affine transform
///
/// Composition follows the SVG convention: `a * b` applies `b` first, then
/// `a`. A node's device transform is therefore `parent * local`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    /// Matrix elements [a, b, c, d, e, f]
    /// | a  c  e |
    /// | b  d  f |
    /// | 0  0  1 |
    pub elements: [f64; 6],
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        elements: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self {
            elements: [a, b, c, d, e, f],
        }
    }

    pub fn translation(x: f64, y: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, x, y)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Rotation by `angle` radians (clockwise on a y-down canvas)
    pub fn rotation(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    pub fn rotation_degrees(degrees: f64) -> Self {
        Self::rotation(degrees.to_radians())
    }

    /// Maps the unit square onto `rect`
    pub fn from_rect(rect: &Rect) -> Self {
        Self::new(rect.width(), 0.0, 0.0, rect.height(), rect.x(), rect.y())
    }

    pub fn a(&self) -> f64 {
        self.elements[0]
    }

    pub fn b(&self) -> f64 {
        self.elements[1]
    }

    pub fn c(&self) -> f64 {
        self.elements[2]
    }

    pub fn d(&self) -> f64 {
        self.elements[3]
    }

    pub fn e(&self) -> f64 {
        self.elements[4]
    }

    pub fn f(&self) -> f64 {
        self.elements[5]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn transform_point(&self, point: Point) -> Point {
        let [a, b, c, d, e, f] = self.elements;
        Point::new(a * point.x + c * point.y + e, b * point.x + d * point.y + f)
    }

    /// Transform ignoring translation
    pub fn transform_vector(&self, v: Point) -> Point {
        let [a, b, c, d, _, _] = self.elements;
        Point::new(a * v.x + c * v.y, b * v.x + d * v.y)
    }

    pub fn determinant(&self) -> f64 {
        self.a() * self.d() - self.b() * self.c()
    }

    /// Geometric mean scale factor (`sqrt(|det|)`)
    pub fn expansion(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    /// Horizontal and vertical scale of the transformed unit vectors
    pub fn scale_factors(&self) -> (f64, f64) {
        (self.a().hypot(self.b()), self.c().hypot(self.d()))
    }

    /// Concatenate: the result applies `other` first, then `self`
    pub fn then(&self, other: &Affine) -> Affine {
        let [a1, b1, c1, d1, e1, f1] = self.elements;
        let [a2, b2, c2, d2, e2, f2] = other.elements;
        Affine::new(
            a1 * a2 + c1 * b2,
            b1 * a2 + d1 * b2,
            a1 * c2 + c1 * d2,
            b1 * c2 + d1 * d2,
            a1 * e2 + c1 * f2 + e1,
            b1 * e2 + d1 * f2 + f1,
        )
    }

    pub fn pre_translate(&self, x: f64, y: f64) -> Affine {
        self.then(&Affine::translation(x, y))
    }

    pub fn pre_scale(&self, sx: f64, sy: f64) -> Affine {
        self.then(&Affine::scale(sx, sy))
    }

    /// Inverse, `None` when singular
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let [a, b, c, d, e, f] = self.elements;
        let inv = 1.0 / det;
        Some(Affine::new(
            d * inv,
            -b * inv,
            -c * inv,
            a * inv,
            (c * f - d * e) * inv,
            (b * e - a * f) * inv,
        ))
    }

    pub fn approx_eq(&self, other: &Affine, eps: f64) -> bool {
        self.elements
            .iter()
            .zip(other.elements.iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl Mul for Affine {
    type Output = Affine;

    fn mul(self, rhs: Affine) -> Affine {
        self.then(&rhs)
    }
}
