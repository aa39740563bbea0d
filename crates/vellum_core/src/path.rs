//! Path vectors: sequences of line / cubic Bézier subpaths

use smallvec::SmallVec;

use crate::geometry::{Affine, Point, Rect};

/// Kappa for approximating a quarter circle with one cubic
const KAPPA: f64 = 0.552_284_749_830_793_4;

/// A segment ending at its last point; the start is the previous segment's end
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Segment {
    Line(Point),
    Cubic(Point, Point, Point),
}

impl Segment {
    pub fn end(&self) -> Point {
        match *self {
            Segment::Line(p) => p,
            Segment::Cubic(_, _, p) => p,
        }
    }

    fn transform(&self, t: &Affine) -> Segment {
        match *self {
            Segment::Line(p) => Segment::Line(t.transform_point(p)),
            Segment::Cubic(c1, c2, p) => Segment::Cubic(
                t.transform_point(c1),
                t.transform_point(c2),
                t.transform_point(p),
            ),
        }
    }
}

/// One connected run of segments
#[derive(Clone, Debug, PartialEq)]
pub struct SubPath {
    pub start: Point,
    pub segments: SmallVec<[Segment; 8]>,
    pub closed: bool,
}

impl SubPath {
    pub fn new(start: Point) -> Self {
        Self {
            start,
            segments: SmallVec::new(),
            closed: false,
        }
    }

    pub fn end(&self) -> Point {
        self.segments.last().map(Segment::end).unwrap_or(self.start)
    }
}

/// A sequence of subpaths
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathVector {
    subpaths: Vec<SubPath>,
}

impl PathVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subpaths(&self) -> &[SubPath] {
        &self.subpaths
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    pub fn push(&mut self, subpath: SubPath) {
        self.subpaths.push(subpath);
    }

    /// Append all subpaths of `other`
    pub fn extend(&mut self, other: PathVector) {
        self.subpaths.extend(other.subpaths);
    }

    /// Axis-aligned rectangle
    pub fn rect(rect: Rect) -> Self {
        PathBuilder::new()
            .move_to(rect.min_x(), rect.min_y())
            .line_to(rect.max_x(), rect.min_y())
            .line_to(rect.max_x(), rect.max_y())
            .line_to(rect.min_x(), rect.max_y())
            .close()
            .build()
    }

    /// Ellipse made of four cubic arcs
    pub fn ellipse(cx: f64, cy: f64, rx: f64, ry: f64) -> Self {
        let kx = rx * KAPPA;
        let ky = ry * KAPPA;
        PathBuilder::new()
            .move_to(cx + rx, cy)
            .cubic_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry)
            .cubic_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy)
            .cubic_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry)
            .cubic_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy)
            .close()
            .build()
    }

    /// Straight two-point path
    pub fn line(from: Point, to: Point) -> Self {
        PathBuilder::new().move_to(from.x, from.y).line_to(to.x, to.y).build()
    }

    pub fn transform(&self, t: &Affine) -> PathVector {
        if t.is_identity() {
            return self.clone();
        }
        PathVector {
            subpaths: self
                .subpaths
                .iter()
                .map(|sp| SubPath {
                    start: t.transform_point(sp.start),
                    segments: sp.segments.iter().map(|s| s.transform(t)).collect(),
                    closed: sp.closed,
                })
                .collect(),
        }
    }

    /// Exact geometric bounds, `None` for an empty path
    pub fn bounds(&self) -> Option<Rect> {
        let mut acc = BoundsAcc::default();
        for sp in &self.subpaths {
            acc.add(sp.start);
            let mut prev = sp.start;
            for seg in &sp.segments {
                match *seg {
                    Segment::Line(p) => acc.add(p),
                    Segment::Cubic(c1, c2, p) => {
                        acc.add(p);
                        for t in cubic_extrema(prev.x, c1.x, c2.x, p.x)
                            .into_iter()
                            .chain(cubic_extrema(prev.y, c1.y, c2.y, p.y))
                        {
                            acc.add(cubic_point(prev, c1, c2, p, t));
                        }
                    }
                }
                prev = seg.end();
            }
        }
        acc.finish()
    }

    /// Bounds after applying `t`
    pub fn bounds_with(&self, t: &Affine) -> Option<Rect> {
        self.transform(t).bounds()
    }
}

#[derive(Default)]
struct BoundsAcc {
    rect: Option<(f64, f64, f64, f64)>,
}

impl BoundsAcc {
    fn add(&mut self, p: Point) {
        self.rect = Some(match self.rect {
            None => (p.x, p.y, p.x, p.y),
            Some((x0, y0, x1, y1)) => (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        });
    }

    fn finish(self) -> Option<Rect> {
        self.rect
            .map(|(x0, y0, x1, y1)| Rect::from_extents(x0, y0, x1, y1))
    }
}

fn cubic_point(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let mt = 1.0 - t;
    let a = mt * mt * mt;
    let b = 3.0 * mt * mt * t;
    let c = 3.0 * mt * t * t;
    let d = t * t * t;
    Point::new(
        a * p0.x + b * p1.x + c * p2.x + d * p3.x,
        a * p0.y + b * p1.y + c * p2.y + d * p3.y,
    )
}

/// Parameters in (0, 1) where the 1D cubic's derivative vanishes
fn cubic_extrema(p0: f64, p1: f64, p2: f64, p3: f64) -> SmallVec<[f64; 2]> {
    let a = -p0 + 3.0 * p1 - 3.0 * p2 + p3;
    let b = 2.0 * (p0 - 2.0 * p1 + p2);
    let c = p1 - p0;
    let mut out = SmallVec::new();
    let mut push = |t: f64| {
        if t > 0.0 && t < 1.0 {
            out.push(t);
        }
    };
    if a.abs() < 1e-12 {
        if b.abs() > 1e-12 {
            push(-c / b);
        }
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let sq = disc.sqrt();
            push((-b + sq) / (2.0 * a));
            push((-b - sq) / (2.0 * a));
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for constructing path vectors
#[derive(Default)]
pub struct PathBuilder {
    path: PathVector,
    current: Option<SubPath>,
    pending_start: Option<Point>,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current point, if a subpath is open
    pub fn current_point(&self) -> Option<Point> {
        self.current.as_ref().map(SubPath::end)
    }

    /// Start point of the open subpath
    pub fn subpath_start(&self) -> Option<Point> {
        self.current.as_ref().map(|sp| sp.start)
    }

    pub fn move_to(mut self, x: f64, y: f64) -> Self {
        self.flush();
        self.current = Some(SubPath::new(Point::new(x, y)));
        self
    }

    pub fn line_to(mut self, x: f64, y: f64) -> Self {
        self.open().segments.push(Segment::Line(Point::new(x, y)));
        self
    }

    /// Quadratic curve, stored as the equivalent cubic
    pub fn quad_to(mut self, cx: f64, cy: f64, x: f64, y: f64) -> Self {
        let p0 = self.open().end();
        let c = Point::new(cx, cy);
        let p = Point::new(x, y);
        let c1 = p0.lerp(c, 2.0 / 3.0);
        let c2 = p.lerp(c, 2.0 / 3.0);
        self.open().segments.push(Segment::Cubic(c1, c2, p));
        self
    }

    pub fn cubic_to(mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) -> Self {
        self.open().segments.push(Segment::Cubic(
            Point::new(c1x, c1y),
            Point::new(c2x, c2y),
            Point::new(x, y),
        ));
        self
    }

    pub fn close(mut self) -> Self {
        if let Some(mut sp) = self.current.take() {
            sp.closed = true;
            let start = sp.start;
            self.path.push(sp);
            // drawing may continue from the closed subpath's start
            self.pending_start = Some(start);
        }
        self
    }

    pub fn build(mut self) -> PathVector {
        self.flush();
        self.path
    }

    fn open(&mut self) -> &mut SubPath {
        let start = self.pending_start.take().unwrap_or(Point::ZERO);
        self.current.get_or_insert_with(|| SubPath::new(start))
    }

    fn flush(&mut self) {
        self.pending_start = None;
        if let Some(sp) = self.current.take() {
            self.path.push(sp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_bounds() {
        let p = PathVector::rect(Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(p.bounds(), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
        assert!(p.subpaths()[0].closed);
    }

    #[test]
    fn test_cubic_bounds_are_tight() {
        // control points poke far out, the curve itself reaches 0.75 * 10
        let p = PathBuilder::new()
            .move_to(0.0, 0.0)
            .cubic_to(0.0, 10.0, 10.0, 10.0, 10.0, 0.0)
            .build();
        let b = p.bounds().unwrap();
        assert!((b.max_y() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_ellipse_bounds() {
        let b = PathVector::ellipse(5.0, 5.0, 5.0, 2.0).bounds().unwrap();
        assert!((b.width() - 10.0).abs() < 1e-9);
        assert!((b.height() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_draw_after_close_starts_at_previous_start() {
        let p = PathBuilder::new()
            .move_to(1.0, 1.0)
            .line_to(5.0, 1.0)
            .close()
            .line_to(1.0, 5.0)
            .build();
        assert_eq!(p.subpaths().len(), 2);
        assert_eq!(p.subpaths()[1].start, Point::new(1.0, 1.0));
    }
}
