//! Paint-server resolution
//!
//! Turns a style paint plus the painted item's bounding box into a
//! `NativePaint` whose `paint_to_user` matrix maps paint space into the
//! item's user space:
//!
//! - gradients: `bbox2user * gradientTransform` for bounding-box units
//! - patterns: a tile rendered off-screen and repeated
//! - hatches: a strip of stroked lines rendered off-screen and repeated
//!
//! Tile rendering needs the scene, so it goes through `TileSource`. The
//! geometry of each tile is computed here as a plan.

use std::sync::Arc;

use tiny_skia::Pixmap;
use vellum_core::{
    Affine, Color, Document, GradientStop, Hatch, ItemId, Paint, PaintServer, PaintServerId,
    PathVector, Point, Rect, ResolvedLinear, ResolvedPattern, ResolvedRadial, Style, Units,
};

use crate::canvas::{LinearPaint, NativePaint, PaintStop, RadialPaint, TilePaint};
use crate::error::Result;

/// Largest off-screen tile edge in pixels
pub const MAX_TILE_SIZE: u32 = 4096;

/// Vertical repeats of a custom hatch path
const MAX_HATCH_REPEATS: usize = 1000;

/// Horizontal copies drawn for a hatch with visible overflow
const MAX_HATCH_STEPS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaintRole {
    Fill,
    Stroke,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tile plans
// ─────────────────────────────────────────────────────────────────────────────

/// Off-screen geometry of one pattern tile
#[derive(Clone, Debug, PartialEq)]
pub struct PatternPlan {
    pub width: u32,
    pub height: u32,
    /// Pattern content space to tile pixels
    pub content_to_pixel: Affine,
    /// Tile pixels to user space
    pub paint_to_user: Affine,
    pub children: Vec<ItemId>,
}

/// One stroked line of a hatch, in hatch content space
#[derive(Clone, Debug, PartialEq)]
pub struct HatchStroke {
    pub path: PathVector,
    pub style: Style,
}

/// Off-screen geometry of one hatch strip
#[derive(Clone, Debug, PartialEq)]
pub struct HatchPlan {
    pub width: u32,
    pub height: u32,
    /// Content-to-pixel transform of every horizontal copy
    pub steps: Vec<Affine>,
    pub paint_to_user: Affine,
    pub strokes: Vec<HatchStroke>,
}

/// Renders tile content for the resolver
pub trait TileSource {
    fn document(&self) -> &Document;

    /// User-to-device transform of the painted item
    fn device_transform(&self) -> Affine;

    /// Off-screen pixels per device pixel
    fn oversample(&self) -> f64;

    /// Enter a paint server; false when it is already being resolved
    fn enter_server(&mut self, id: PaintServerId) -> Result<bool>;

    fn leave_server(&mut self, id: PaintServerId);

    fn render_pattern(&mut self, plan: &PatternPlan) -> Result<Option<Arc<Pixmap>>>;

    fn render_hatch(&mut self, plan: &HatchPlan) -> Result<Option<Arc<Pixmap>>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve `paint` for an item with `bbox`, folding `alpha` into the result
///
/// `Ok(None)` means nothing is painted. Unset fills are black, unset
/// strokes are nothing, and a server that cannot be used falls back to the
/// paint's fallback color when it has one.
pub fn resolve_paint(
    paint: &Paint,
    role: PaintRole,
    bbox: Option<Rect>,
    alpha: f32,
    tiles: &mut dyn TileSource,
) -> Result<Option<NativePaint>> {
    match *paint {
        Paint::None => Ok(None),
        Paint::Unset => Ok(match role {
            PaintRole::Fill => Some(NativePaint::Solid(Color::BLACK.fade(alpha))),
            PaintRole::Stroke => None,
        }),
        Paint::Color(c) => Ok(Some(NativePaint::Solid(c.fade(alpha)))),
        Paint::Server { id, fallback } => {
            let resolved = resolve_server(id, bbox, alpha, tiles)?;
            if resolved.is_none() {
                if let Some(color) = fallback {
                    return Ok(Some(NativePaint::Solid(color.fade(alpha))));
                }
            }
            Ok(resolved)
        }
    }
}

/// Paints that can absorb an item's opacity into their own alpha
pub fn is_mergeable(doc: &Document, paint: &Paint) -> bool {
    match paint {
        Paint::None | Paint::Unset | Paint::Color(_) => true,
        Paint::Server { id, .. } => matches!(
            doc.paint_server(*id),
            Some(PaintServer::Solid { .. } | PaintServer::Linear(_) | PaintServer::Radial(_))
        ),
    }
}

/// What a server needs after looking at the document
enum ServerStep {
    Done(Option<NativePaint>),
    Pattern(PatternPlan),
    Hatch(HatchPlan),
}

fn plan_server(
    doc: &Document,
    id: PaintServerId,
    bbox: Option<Rect>,
    alpha: f32,
    device: &Affine,
    oversample: f64,
) -> ServerStep {
    let Some(server) = doc.paint_server(id) else {
        tracing::warn!("unknown paint server {:?}", id);
        return ServerStep::Done(None);
    };
    match server {
        PaintServer::Solid { color, opacity } => {
            ServerStep::Done(Some(NativePaint::Solid(color.fade(opacity * alpha))))
        }
        PaintServer::Linear(_) => match doc.resolve_linear(id) {
            Ok(g) => ServerStep::Done(linear_paint(&g, bbox, alpha)),
            Err(e) => {
                tracing::warn!("linear gradient ignored: {e}");
                ServerStep::Done(None)
            }
        },
        PaintServer::Radial(_) => match doc.resolve_radial(id) {
            Ok(g) => ServerStep::Done(radial_paint(&g, bbox, alpha)),
            Err(e) => {
                tracing::warn!("radial gradient ignored: {e}");
                ServerStep::Done(None)
            }
        },
        PaintServer::Pattern(_) => match doc.resolve_pattern(id) {
            Ok(p) => match plan_pattern(&p, bbox, device, oversample) {
                Some(plan) => ServerStep::Pattern(plan),
                None => ServerStep::Done(None),
            },
            Err(e) => {
                tracing::warn!("pattern ignored: {e}");
                ServerStep::Done(None)
            }
        },
        PaintServer::Hatch(hatch) => match plan_hatch(hatch, bbox, device, oversample) {
            Some(plan) => ServerStep::Hatch(plan),
            None => ServerStep::Done(None),
        },
    }
}

fn resolve_server(
    id: PaintServerId,
    bbox: Option<Rect>,
    alpha: f32,
    tiles: &mut dyn TileSource,
) -> Result<Option<NativePaint>> {
    let device = tiles.device_transform();
    let oversample = tiles.oversample();
    let step = plan_server(tiles.document(), id, bbox, alpha, &device, oversample);
    let (tile, paint_to_user) = match step {
        ServerStep::Done(paint) => return Ok(paint),
        ServerStep::Pattern(plan) => {
            if !tiles.enter_server(id)? {
                tracing::warn!("pattern {:?} references itself, ignored", id);
                return Ok(None);
            }
            let tile = tiles.render_pattern(&plan);
            tiles.leave_server(id);
            (tile?, plan.paint_to_user)
        }
        ServerStep::Hatch(plan) => {
            if !tiles.enter_server(id)? {
                tracing::warn!("hatch {:?} references itself, ignored", id);
                return Ok(None);
            }
            let tile = tiles.render_hatch(&plan);
            tiles.leave_server(id);
            (tile?, plan.paint_to_user)
        }
    };
    Ok(tile.map(|pixmap| {
        NativePaint::Tile(TilePaint {
            pixmap,
            paint_to_user,
            opacity: alpha,
        })
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Gradients
// ─────────────────────────────────────────────────────────────────────────────

/// Maps the unit square onto `bbox`
pub fn bbox_to_user(bbox: &Rect) -> Affine {
    Affine::new(bbox.width(), 0.0, 0.0, bbox.height(), bbox.x(), bbox.y())
}

/// Gradient space to user space; `None` when bounding-box units meet an
/// empty box
fn gradient_to_user(units: Units, transform: &Affine, bbox: Option<Rect>) -> Option<Affine> {
    match units {
        Units::UserSpaceOnUse => Some(*transform),
        Units::ObjectBoundingBox => {
            let bbox = bbox.filter(|b| b.width() > 0.0 && b.height() > 0.0)?;
            Some(bbox_to_user(&bbox) * *transform)
        }
    }
}

/// Stops with opacity and `alpha` folded into the color; offsets clamped
/// into [0, 1] and made non-decreasing
fn paint_stops(stops: &[GradientStop], alpha: f32) -> Vec<PaintStop> {
    let mut last = 0.0f32;
    stops
        .iter()
        .map(|s| {
            last = s.offset.clamp(0.0, 1.0).max(last);
            PaintStop {
                offset: last,
                color: s.color.with_alpha(s.color.a * s.opacity * alpha),
            }
        })
        .collect()
}

fn last_stop(stops: &[PaintStop]) -> Option<NativePaint> {
    stops.last().map(|s| NativePaint::Solid(s.color))
}

pub fn linear_paint(g: &ResolvedLinear, bbox: Option<Rect>, alpha: f32) -> Option<NativePaint> {
    let stops = paint_stops(&g.stops, alpha);
    if stops.is_empty() {
        return None;
    }
    let paint_to_user = gradient_to_user(g.units, &g.transform, bbox)?;
    if stops.len() == 1 || g.start.distance(g.end) <= f64::EPSILON {
        return last_stop(&stops);
    }
    Some(NativePaint::Linear(LinearPaint {
        start: g.start,
        end: g.end,
        stops,
        spread: g.spread,
        paint_to_user,
    }))
}

pub fn radial_paint(g: &ResolvedRadial, bbox: Option<Rect>, alpha: f32) -> Option<NativePaint> {
    let stops = paint_stops(&g.stops, alpha);
    if stops.is_empty() {
        return None;
    }
    let paint_to_user = gradient_to_user(g.units, &g.transform, bbox)?;
    if stops.len() == 1 || g.radius <= 0.0 {
        return last_stop(&stops);
    }
    // focal points outside the circle move onto its edge
    let mut focal = g.focal;
    let (dx, dy) = (focal.x - g.center.x, focal.y - g.center.y);
    let dist = (dx * dx + dy * dy).sqrt();
    let limit = g.radius * 0.999;
    if dist > limit {
        focal = Point::new(g.center.x + dx * limit / dist, g.center.y + dy * limit / dist);
    }
    Some(NativePaint::Radial(RadialPaint {
        center: g.center,
        radius: g.radius,
        focal,
        stops,
        spread: g.spread,
        paint_to_user,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────────────

/// Tile pixel size for a tile edge of `len` user units scaled by `scale`
fn tile_pixels(len: f64, scale: f64, oversample: f64) -> u32 {
    let px = (len * scale * oversample - 0.5).ceil();
    if px.is_finite() {
        px.clamp(1.0, MAX_TILE_SIZE as f64) as u32
    } else {
        1
    }
}

fn usable(bbox: Option<Rect>) -> Option<Rect> {
    bbox.filter(|b| b.width() > 0.0 && b.height() > 0.0)
}

/// Geometry of a pattern tile for an item with `bbox`, drawn through
/// `device` (user to device)
pub fn plan_pattern(
    p: &ResolvedPattern,
    bbox: Option<Rect>,
    device: &Affine,
    oversample: f64,
) -> Option<PatternPlan> {
    let tile = match p.units {
        Units::UserSpaceOnUse => p.rect,
        Units::ObjectBoundingBox => {
            let b = usable(bbox)?;
            Rect::new(
                b.x() + p.rect.x() * b.width(),
                b.y() + p.rect.y() * b.height(),
                p.rect.width() * b.width(),
                p.rect.height() * b.height(),
            )
        }
    };
    let (w, h) = (tile.width(), tile.height());
    if !(w > 0.0 && h > 0.0) {
        return None;
    }

    let ps2user = p.transform * Affine::translation(tile.x(), tile.y());
    let content2tile = match (p.view_box, p.content_units) {
        (Some(vb), _) if vb.width() > 0.0 && vb.height() > 0.0 => {
            p.aspect.view_box_transform(&vb, &Rect::new(0.0, 0.0, w, h))
        }
        (_, Units::ObjectBoundingBox) => {
            let b = usable(bbox)?;
            Affine::scale(b.width(), b.height())
        }
        _ => Affine::IDENTITY,
    };

    let (sx, sy) = (*device * ps2user).scale_factors();
    let width = tile_pixels(w, sx, oversample);
    let height = tile_pixels(h, sy, oversample);
    let (px, py) = (width as f64 / w, height as f64 / h);

    Some(PatternPlan {
        width,
        height,
        content_to_pixel: Affine::scale(px, py) * content2tile,
        paint_to_user: ps2user * Affine::scale(1.0 / px, 1.0 / py),
        children: p.children.clone(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Hatches
// ─────────────────────────────────────────────────────────────────────────────

fn stroke_width(style: &Style) -> f64 {
    if style.no_stroke() {
        0.0
    } else {
        style.stroke_width
    }
}

/// Geometry of a hatch strip covering `bbox`
///
/// The strip is one pitch wide and tall enough to cover the rotated box.
/// With visible overflow the paths are drawn once per pitch across their
/// horizontal extent so wide strokes spill into neighbouring strips.
pub fn plan_hatch(
    hatch: &Hatch,
    bbox: Option<Rect>,
    device: &Affine,
    oversample: f64,
) -> Option<HatchPlan> {
    let b = usable(bbox)?;
    if !(hatch.pitch > 0.0) {
        return None;
    }
    let (bw, bh) = match hatch.units {
        Units::ObjectBoundingBox => (b.width(), b.height()),
        Units::UserSpaceOnUse => (1.0, 1.0),
    };

    let ps2user = hatch.transform
        * Affine::rotation_degrees(hatch.rotate)
        * Affine::translation(hatch.x * bw, hatch.y * bh);
    let user2ps = ps2user.inverse()?;

    // vertical extent of the box in hatch space
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for corner in b.corners() {
        let y = user2ps.transform_point(corner).y;
        min = min.min(y);
        max = max.max(y);
    }
    let tile_w = hatch.pitch * bw;
    let tile_h = max - min;
    if !(tile_w > 0.0 && tile_h > 0.0) {
        return None;
    }
    let render_y = min;

    let content2ps = match hatch.content_units {
        Units::ObjectBoundingBox => Affine::scale(b.width(), b.height()),
        Units::UserSpaceOnUse => Affine::IDENTITY,
    };
    let ps2content = content2ps.inverse()?;
    let strip_top = ps2content.transform_point(Point::new(0.0, render_y)).y;
    let strip_bottom = ps2content.transform_point(Point::new(0.0, render_y + tile_h)).y;
    let (y0, y1) = (strip_top.min(strip_bottom), strip_top.max(strip_bottom));

    let (sx, sy) = (*device * ps2user).scale_factors();
    let width = tile_pixels(tile_w, sx, oversample);
    let height = tile_pixels(tile_h, sy, oversample);
    let drawing = Affine::scale(width as f64 / tile_w, height as f64 / tile_h)
        * Affine::translation(0.0, -render_y);

    let mut strokes = Vec::new();
    let (mut left, mut right) = (f64::INFINITY, f64::NEG_INFINITY);
    let pitch = hatch.pitch;
    for hp in &hatch.paths {
        let half = stroke_width(&hp.style) / 2.0;
        match &hp.data {
            None => {
                strokes.push(HatchStroke {
                    path: PathVector::line(Point::new(hp.offset, y0), Point::new(hp.offset, y1)),
                    style: hp.style.clone(),
                });
                left = left.min(hp.offset - half);
                right = right.max(hp.offset + half);
            }
            Some(data) => {
                let Some(bounds) = data.bounds() else { continue };
                let path = repeat_vertically(data, &bounds, hp.offset, y0, y1);
                strokes.push(HatchStroke {
                    path,
                    style: hp.style.clone(),
                });
                left = left.min(bounds.min_x() + hp.offset - half);
                right = right.max(bounds.max_x() + hp.offset + half);
            }
        }
    }

    let steps = if hatch.overflow_visible && left.is_finite() && right.is_finite() {
        let start = (right / pitch).floor() * pitch;
        let count = (((start - left) / pitch).ceil() as usize + 1).min(MAX_HATCH_STEPS);
        (0..count)
            .map(|i| drawing * content2ps * Affine::translation(-start + i as f64 * pitch, 0.0))
            .collect()
    } else {
        vec![drawing * content2ps]
    };

    Some(HatchPlan {
        width,
        height,
        steps,
        paint_to_user: ps2user
            * Affine::translation(0.0, render_y)
            * Affine::scale(tile_w / width as f64, tile_h / height as f64),
        strokes,
    })
}

/// `data` shifted by `offset` and repeated by its own height over [y0, y1]
fn repeat_vertically(data: &PathVector, bounds: &Rect, offset: f64, y0: f64, y1: f64) -> PathVector {
    let period = bounds.height();
    if !(period > 0.0) {
        return data.transform(&Affine::translation(offset, 0.0));
    }
    let first = ((y0 - bounds.max_y()) / period).floor() as i64;
    let last = ((y1 - bounds.min_y()) / period).ceil() as i64;
    let mut path = PathVector::new();
    for k in (first..=last).take(MAX_HATCH_REPEATS) {
        path.extend(data.transform(&Affine::translation(offset, k as f64 * period)));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::{AspectRatio, SpreadMethod};

    fn stops() -> Vec<GradientStop> {
        vec![
            GradientStop::new(0.0, Color::RED),
            GradientStop::new(1.0, Color::BLUE),
        ]
    }

    fn linear(units: Units) -> ResolvedLinear {
        ResolvedLinear {
            units,
            transform: Affine::IDENTITY,
            spread: SpreadMethod::Pad,
            start: Point::new(0.0, 0.0),
            end: Point::new(1.0, 0.0),
            stops: stops(),
        }
    }

    #[test]
    fn test_bbox_gradient_maps_onto_box() {
        let bbox = Rect::new(10.0, 20.0, 100.0, 50.0);
        let Some(NativePaint::Linear(g)) = linear_paint(&linear(Units::ObjectBoundingBox), Some(bbox), 1.0)
        else {
            panic!("expected a linear paint");
        };
        let end = g.paint_to_user.transform_point(g.end);
        assert!((end.x - 110.0).abs() < 1e-9 && (end.y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_resolution_is_idempotent() {
        let bbox = Some(Rect::new(0.0, 0.0, 40.0, 40.0));
        let g = linear(Units::ObjectBoundingBox);
        assert_eq!(linear_paint(&g, bbox, 0.5), linear_paint(&g, bbox, 0.5));
    }

    #[test]
    fn test_bbox_gradient_on_empty_box_paints_nothing() {
        let bbox = Some(Rect::new(0.0, 0.0, 40.0, 0.0));
        assert!(linear_paint(&linear(Units::ObjectBoundingBox), bbox, 1.0).is_none());
        assert!(linear_paint(&linear(Units::UserSpaceOnUse), bbox, 1.0).is_some());
    }

    #[test]
    fn test_degenerate_gradients_use_last_stop() {
        let mut g = linear(Units::UserSpaceOnUse);
        g.end = g.start;
        assert_eq!(linear_paint(&g, None, 1.0), Some(NativePaint::Solid(Color::BLUE)));

        let r = ResolvedRadial {
            units: Units::UserSpaceOnUse,
            transform: Affine::IDENTITY,
            spread: SpreadMethod::Pad,
            center: Point::new(0.5, 0.5),
            radius: 0.0,
            focal: Point::new(0.5, 0.5),
            stops: stops(),
        };
        assert_eq!(radial_paint(&r, None, 1.0), Some(NativePaint::Solid(Color::BLUE)));
    }

    #[test]
    fn test_stop_alpha_folds_opacity() {
        let mut g = linear(Units::UserSpaceOnUse);
        g.stops[0].opacity = 0.5;
        let Some(NativePaint::Linear(p)) = linear_paint(&g, None, 0.5) else {
            panic!("expected a linear paint");
        };
        assert!((p.stops[0].color.a - 0.25).abs() < 1e-6);
        assert!((p.stops[1].color.a - 0.5).abs() < 1e-6);
    }

    fn pattern(units: Units, rect: Rect) -> ResolvedPattern {
        ResolvedPattern {
            units,
            content_units: Units::UserSpaceOnUse,
            transform: Affine::IDENTITY,
            rect,
            view_box: None,
            aspect: AspectRatio::default(),
            overflow_visible: false,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_pattern_tile_scales_with_device() {
        let p = pattern(Units::UserSpaceOnUse, Rect::new(0.0, 0.0, 10.0, 10.0));
        let one = plan_pattern(&p, None, &Affine::IDENTITY, 1.0).unwrap();
        let three = plan_pattern(&p, None, &Affine::scale(3.0, 3.0), 1.0).unwrap();
        assert_eq!((one.width, one.height), (10, 10));
        assert_eq!((three.width, three.height), (30, 30));

        // one tile pixel maps back onto the same user extent
        let corner = three.paint_to_user.transform_point(Point::new(30.0, 30.0));
        assert!((corner.x - 10.0).abs() < 1e-9 && (corner.y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_tile_clamped() {
        let p = pattern(Units::UserSpaceOnUse, Rect::new(0.0, 0.0, 1e6, 1e-6));
        let plan = plan_pattern(&p, None, &Affine::IDENTITY, 4.0).unwrap();
        assert_eq!((plan.width, plan.height), (MAX_TILE_SIZE, 1));
    }

    #[test]
    fn test_bbox_pattern_offsets_by_box() {
        let p = pattern(Units::ObjectBoundingBox, Rect::new(0.0, 0.0, 0.25, 0.5));
        let plan = plan_pattern(&p, Some(Rect::new(100.0, 50.0, 40.0, 20.0)), &Affine::IDENTITY, 1.0)
            .unwrap();
        assert_eq!((plan.width, plan.height), (10, 10));
        let origin = plan.paint_to_user.transform_point(Point::ZERO);
        assert_eq!((origin.x, origin.y), (100.0, 50.0));
        assert!(plan_pattern(&p, None, &Affine::IDENTITY, 1.0).is_none());
    }

    fn hatch() -> Hatch {
        Hatch {
            units: Units::UserSpaceOnUse,
            pitch: 10.0,
            paths: vec![vellum_core::HatchPath {
                offset: 5.0,
                data: None,
                style: Style {
                    fill: Paint::None,
                    stroke: Paint::Color(Color::BLACK),
                    stroke_width: 2.0,
                    ..Style::default()
                },
            }],
            ..Hatch::default()
        }
    }

    #[test]
    fn test_hatch_strip_spans_box() {
        let plan = plan_hatch(&hatch(), Some(Rect::new(0.0, 0.0, 100.0, 40.0)), &Affine::IDENTITY, 1.0)
            .unwrap();
        assert_eq!((plan.width, plan.height), (10, 40));
        assert_eq!(plan.steps.len(), 1);
        let line = plan.strokes[0].path.bounds().unwrap();
        assert_eq!((line.min_y(), line.max_y()), (0.0, 40.0));
    }

    #[test]
    fn test_hatch_overflow_draws_neighbours() {
        let mut h = hatch();
        h.overflow_visible = true;
        h.paths[0].offset = 9.0;
        h.paths[0].style.stroke_width = 4.0;
        let plan = plan_hatch(&h, Some(Rect::new(0.0, 0.0, 100.0, 40.0)), &Affine::IDENTITY, 1.0)
            .unwrap();
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn test_hatch_without_area_paints_nothing() {
        assert!(plan_hatch(&hatch(), Some(Rect::new(0.0, 0.0, 10.0, 0.0)), &Affine::IDENTITY, 1.0).is_none());
        assert!(plan_hatch(&hatch(), None, &Affine::IDENTITY, 1.0).is_none());
    }
}
