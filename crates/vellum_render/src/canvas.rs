//! Drawing surface abstraction
//!
//! A `Canvas` is the backend half of a render context: it receives fully
//! resolved geometry and paint in device space and knows nothing about the
//! document. Two implementations exist:
//!
//! - `RasterCanvas`: tiny-skia pixmaps, owned or borrowed
//! - `PdfCanvas`: one page of a hand-written PDF file
//!
//! Groups are two-step: `end_group` closes the group and returns a handle,
//! `paint_group` composites it. The gap lets the render context apply a clip
//! between the two on vector targets.

use std::sync::Arc;

use smallvec::SmallVec;
use tiny_skia::Pixmap;
use vellum_core::{
    Affine, Color, FillRule, FontId, ImageRendering, LineCap, LineJoin, PathVector, Point, Rect,
    Size, SpreadMethod,
};
use vellum_image::ImageData;

use crate::error::Result;
use crate::mask::{Coverage, CoverageGrid};

// ─────────────────────────────────────────────────────────────────────────────
// Paint
// ─────────────────────────────────────────────────────────────────────────────

/// Gradient stop with opacity folded into the color alpha
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaintStop {
    pub offset: f32,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinearPaint {
    pub start: Point,
    pub end: Point,
    pub stops: Vec<PaintStop>,
    pub spread: SpreadMethod,
    /// Gradient space to user space
    pub paint_to_user: Affine,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RadialPaint {
    pub center: Point,
    pub radius: f64,
    pub focal: Point,
    pub stops: Vec<PaintStop>,
    pub spread: SpreadMethod,
    pub paint_to_user: Affine,
}

/// Pre-rendered repeating tile
#[derive(Clone, Debug, PartialEq)]
pub struct TilePaint {
    /// Premultiplied tile pixels
    pub pixmap: Arc<Pixmap>,
    /// Tile pixel space to user space
    pub paint_to_user: Affine,
    pub opacity: f32,
}

/// Backend-neutral resolved paint
#[derive(Clone, Debug, PartialEq)]
pub enum NativePaint {
    Solid(Color),
    Linear(LinearPaint),
    Radial(RadialPaint),
    Tile(TilePaint),
}

impl NativePaint {
    /// Paint-to-user matrix; identity for solid colors
    pub fn paint_to_user(&self) -> Affine {
        match self {
            NativePaint::Solid(_) => Affine::IDENTITY,
            NativePaint::Linear(g) => g.paint_to_user,
            NativePaint::Radial(g) => g.paint_to_user,
            NativePaint::Tile(t) => t.paint_to_user,
        }
    }

    pub fn is_transparent(&self) -> bool {
        match self {
            NativePaint::Solid(c) => c.a <= 0.0,
            NativePaint::Linear(g) => g.stops.iter().all(|s| s.color.a <= 0.0),
            NativePaint::Radial(g) => g.stops.iter().all(|s| s.color.a <= 0.0),
            NativePaint::Tile(t) => t.opacity <= 0.0,
        }
    }
}

/// Stroke geometry in user units
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeStyle {
    pub width: f64,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f64,
    /// Empty disables dashing
    pub dash: SmallVec<[f64; 4]>,
    pub dash_offset: f64,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            width: 1.0,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 4.0,
            dash: SmallVec::new(),
            dash_offset: 0.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clip regions
// ─────────────────────────────────────────────────────────────────────────────

/// One clip child: geometry in the clipped item's user space
#[derive(Clone, Debug, PartialEq)]
pub struct ClipShape {
    pub path: PathVector,
    pub rule: FillRule,
}

/// Union of shapes, optionally intersected with an outer region
///
/// A region with no shapes clips everything away.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipRegion {
    pub shapes: Vec<ClipShape>,
    pub within: Option<Box<ClipRegion>>,
}

impl ClipRegion {
    pub fn rect(rect: Rect) -> Self {
        Self {
            shapes: vec![ClipShape {
                path: PathVector::rect(rect),
                rule: FillRule::NonZero,
            }],
            within: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Glyph runs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct PlacedGlyph {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub advance: f64,
    /// Outline in font units, y up
    pub outline: Option<Arc<PathVector>>,
}

/// Positioned glyphs of one font at one size
#[derive(Clone, Debug)]
pub struct GlyphRun {
    pub font: FontId,
    pub units_per_em: f64,
    pub size: f64,
    pub glyphs: Vec<PlacedGlyph>,
}

impl GlyphRun {
    /// Union of the glyph outlines in user space
    pub fn outline(&self) -> PathVector {
        let mut path = PathVector::new();
        for glyph in &self.glyphs {
            if let Some(outline) = &glyph.outline {
                let ts = vellum_text::glyph_transform(self.units_per_em, self.size, glyph.x, glyph.y);
                path.extend(outline.transform(&ts));
            }
        }
        path
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Canvas
// ─────────────────────────────────────────────────────────────────────────────

/// Handle of a closed group waiting to be composited
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupId(pub(crate) usize);

/// Backend drawing surface. All transforms map user space to device space.
pub trait Canvas {
    /// Vector targets keep geometry; raster targets rasterize immediately
    fn is_vector(&self) -> bool;

    /// Device size
    fn size(&self) -> Size;

    /// Pixel grid for luminance masks covering `device_bounds`
    fn mask_grid(&self, device_bounds: Option<Rect>) -> Option<CoverageGrid>;

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────

    fn save(&mut self);

    fn restore(&mut self);

    /// Intersect the current clip with `region`
    fn clip(&mut self, region: &ClipRegion, transform: &Affine);

    // ─────────────────────────────────────────────────────────────────────────
    // Drawing
    // ─────────────────────────────────────────────────────────────────────────

    /// Paint the whole surface, ignoring clips
    fn clear(&mut self, color: Color);

    fn fill(&mut self, path: &PathVector, transform: &Affine, paint: &NativePaint, rule: FillRule);

    fn stroke(&mut self, path: &PathVector, transform: &Affine, paint: &NativePaint, stroke: &StrokeStyle);

    /// Draw `image` with its pixel grid mapped by `transform`
    fn draw_image(&mut self, image: &ImageData, transform: &Affine, opacity: f32, rendering: ImageRendering);

    /// Native glyph show. Returns false when the backend can't, in which
    /// case the caller fills outlines instead.
    fn show_glyphs(&mut self, _run: &GlyphRun, _transform: &Affine, _paint: &NativePaint) -> bool {
        false
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────────

    fn begin_group(&mut self);

    fn end_group(&mut self) -> Option<GroupId>;

    /// Composite a closed group with `opacity` through optional coverage
    fn paint_group(&mut self, group: GroupId, opacity: f32, coverage: Option<&Coverage>);

    /// Flush and release the surface. Owned raster surfaces are returned.
    fn finish(self: Box<Self>) -> Result<Option<Pixmap>>;
}
