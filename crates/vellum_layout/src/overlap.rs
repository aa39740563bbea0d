//! Rectangle overlap removal
//!
//! Two separation passes: first horizontal, then vertical. The horizontal pass
//! only separates pairs that are cheaper to push apart sideways, and keeps
//! already separated pairs from sliding into each other. The vertical pass
//! then separates every pair still sharing x extent. Each pass is a VPSC
//! problem over rectangle centers, so the total displacement stays minimal.

use vellum_core::{Document, ItemId, Point, Rect};

use crate::error::Result;
use crate::vpsc::{self, Constraint, Variable};

/// Minimum overlap that counts
const EPSILON: f64 = 1e-9;

/// Separation kept between items, in document units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlapOptions {
    pub gap_x: f64,
    pub gap_y: f64,
}

impl Default for OverlapOptions {
    fn default() -> Self {
        Self {
            gap_x: 0.0,
            gap_y: 0.0,
        }
    }
}

/// Grow `rect` by half the gap on each side
///
/// A negative gap larger than the rectangle collapses that axis onto its
/// midpoint instead of inverting it.
pub fn padded(rect: &Rect, gap_x: f64, gap_y: f64) -> Rect {
    let axis = |min: f64, max: f64, gap: f64| {
        let (lo, hi) = (min - gap / 2.0, max + gap / 2.0);
        if lo > hi {
            let mid = (lo + hi) / 2.0;
            (mid, mid)
        } else {
            (lo, hi)
        }
    };
    let (x0, x1) = axis(rect.min_x(), rect.max_x(), gap_x);
    let (y0, y1) = axis(rect.min_y(), rect.max_y(), gap_y);
    Rect::from_extents(x0, y0, x1, y1)
}

fn overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    a1.min(b1) - a0.max(b0)
}

/// One axis of a rectangle set: centers and half extents
struct Axis {
    center: Vec<f64>,
    half: Vec<f64>,
}

impl Axis {
    fn x(rects: &[Rect]) -> Self {
        Self {
            center: rects.iter().map(|r| r.center().x).collect(),
            half: rects.iter().map(|r| r.width() / 2.0).collect(),
        }
    }

    fn y(rects: &[Rect]) -> Self {
        Self {
            center: rects.iter().map(|r| r.center().y).collect(),
            half: rects.iter().map(|r| r.height() / 2.0).collect(),
        }
    }

    fn min(&self, i: usize) -> f64 {
        self.center[i] - self.half[i]
    }

    fn max(&self, i: usize) -> f64 {
        self.center[i] + self.half[i]
    }

    fn overlap(&self, i: usize, j: usize) -> f64 {
        overlap(self.min(i), self.max(i), self.min(j), self.max(j))
    }

    /// Separation constraint between `i` and `j`, leftmost first
    fn separate(&self, i: usize, j: usize) -> Constraint {
        let gap = self.half[i] + self.half[j];
        let (ci, cj) = (self.center[i], self.center[j]);
        if ci < cj || (ci == cj && i < j) {
            Constraint::new(i, j, gap)
        } else {
            Constraint::new(j, i, gap)
        }
    }

    fn solve(&mut self, cons: &[Constraint]) -> Result<()> {
        if cons.is_empty() {
            return Ok(());
        }
        let vars: Vec<Variable> = self.center.iter().copied().map(Variable::new).collect();
        self.center = vpsc::solve(&vars, cons)?;
        Ok(())
    }
}

/// New centers for `rects` such that no two overlap
///
/// `extra_y` adds vertical constraints between rectangle centers (indices
/// into `rects`) to the second pass.
pub fn separate_rects(rects: &[Rect], extra_y: &[Constraint]) -> Result<Vec<Point>> {
    let n = rects.len();
    let mut xs = Axis::x(rects);
    let mut ys = Axis::y(rects);

    let mut cons = Vec::new();
    for i in 0..n {
        for j in i + 1..n {
            let oy = ys.overlap(i, j);
            if oy <= EPSILON {
                continue;
            }
            let ox = xs.overlap(i, j);
            if ox <= EPSILON || ox <= oy {
                cons.push(xs.separate(i, j));
            }
        }
    }
    tracing::trace!("overlap x pass: {} rects, {} constraints", n, cons.len());
    xs.solve(&cons)?;

    cons.clear();
    for i in 0..n {
        for j in i + 1..n {
            if xs.overlap(i, j) > EPSILON {
                cons.push(ys.separate(i, j));
            }
        }
    }
    cons.extend_from_slice(extra_y);
    tracing::trace!("overlap y pass: {} rects, {} constraints", n, cons.len());
    ys.solve(&cons)?;

    Ok(xs
        .center
        .into_iter()
        .zip(ys.center)
        .map(|(x, y)| Point::new(x, y))
        .collect())
}

/// Move `items` apart until their visual boxes keep the configured gaps
///
/// Connectors and items without a visual box are left alone; connectors
/// attached to moved items are rerouted. Returns the number of items moved.
/// Passing both an item and one of its ancestors moves the item twice.
pub fn remove_overlaps(doc: &mut Document, items: &[ItemId], options: &OverlapOptions) -> Result<usize> {
    let mut nodes = Vec::new();
    let mut rects = Vec::new();
    for &id in items {
        if doc.item(id).map_or(true, |item| item.is_connector()) {
            continue;
        }
        match doc.visual_bbox(id) {
            Some(bbox) => {
                nodes.push(id);
                rects.push(padded(&bbox, options.gap_x, options.gap_y));
            }
            None => tracing::debug!("{:?} has no extent; not moved", id),
        }
    }

    let centers = separate_rects(&rects, &[])?;
    let moved = apply_moves(doc, &nodes, &rects, &centers)?;
    let rerouted = doc.reroute_connectors();
    tracing::debug!("overlap removal moved {} items, rerouted {} connectors", moved, rerouted);
    Ok(moved)
}

/// Move each item by (new center - old center). Returns the number moved.
pub(crate) fn apply_moves(
    doc: &mut Document,
    nodes: &[ItemId],
    rects: &[Rect],
    centers: &[Point],
) -> Result<usize> {
    let mut moved = 0;
    for ((&id, rect), center) in nodes.iter().zip(rects).zip(centers) {
        let old = rect.center();
        let (dx, dy) = (center.x - old.x, center.y - old.y);
        if dx.abs() > EPSILON || dy.abs() > EPSILON {
            doc.move_rel(id, dx, dy)?;
            moved += 1;
        }
    }
    Ok(moved)
}
