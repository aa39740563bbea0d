//! Render context
//!
//! Owns one bound canvas and the state stack the tree walker drives. A
//! context moves through three phases:
//!
//! - `Uninitialized`: created, no surface yet
//! - `SurfaceBound`: exactly one raster, page or borrowed surface bound
//! - `Finished`: output flushed; every further drawing call fails
//!
//! Each item pushes a `RenderState` holding its user-to-device transform,
//! opacity, clip and mask. When the item needs a layer, its content is drawn
//! into a group which `pop_layer` composites through the clip and the
//! luminance of the mask.

use std::io::Write;
use std::sync::Arc;

use tiny_skia::Pixmap;
use vellum_core::{
    geometry::union_opt, Affine, ClipPathId, Color, Document, ItemId, MaskId, PaintServerId,
    PathVector, Rect, Size, Style, Units,
};
use vellum_image::ImageData;

use crate::canvas::{Canvas, ClipRegion, GlyphRun, NativePaint, StrokeStyle};
use crate::error::{RenderError, Result};
use crate::mask::Coverage;
use crate::options::{PdfLevel, PixelFormat, RenderOptions, TextMode};
use crate::paint::{self, bbox_to_user, HatchPlan, PaintRole, PatternPlan, TileSource};
use crate::pdf::PdfCanvas;
use crate::raster::RasterCanvas;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    SurfaceBound,
    Finished,
}

/// Per-item drawing state
#[derive(Clone, Debug, PartialEq)]
pub struct RenderState {
    /// User space to device space
    pub transform: Affine,
    /// The item's own transform, relative to its parent
    pub item_transform: Affine,
    pub opacity: f32,
    /// Opacity is folded into paint alpha instead of a layer
    pub merge_opacity: bool,
    /// The item's content is drawn into a layer
    pub need_layer: bool,
    pub has_overflow: bool,
    pub clip_path: Option<ClipPathId>,
    pub mask: Option<MaskId>,
    /// Bounding box in user space
    pub bbox: Option<Rect>,
}

impl RenderState {
    fn root(transform: Affine) -> Self {
        Self {
            transform,
            item_transform: Affine::IDENTITY,
            opacity: 1.0,
            merge_opacity: true,
            need_layer: false,
            has_overflow: false,
            clip_path: None,
            mask: None,
            bbox: None,
        }
    }

    /// Child state: inherits the transform, nothing else
    fn child(&self) -> Self {
        Self::root(self.transform)
    }
}

/// Resources that may not reference themselves while being rendered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Item(ItemId),
    Server(PaintServerId),
    Clip(ClipPathId),
    Mask(MaskId),
}

/// The document side of rendering, implemented by the tree walker
pub trait SceneContent {
    fn document(&self) -> &Document;

    /// Mark `resource` as being rendered
    ///
    /// Returns false when it already is (a reference cycle). Fails when
    /// resources nest too deeply.
    fn enter(&mut self, resource: Resource) -> Result<bool>;

    fn leave(&mut self, resource: Resource);

    /// Geometry of a clip path for an item with `bbox`, in the item's user
    /// space. `None` when the clip cannot be used.
    fn clip_region(&mut self, clip: ClipPathId, bbox: Option<Rect>) -> Result<Option<ClipRegion>>;

    /// Render `items` into `ctx` under its current state
    fn render_children(&mut self, items: &[ItemId], ctx: &mut RenderContext<'_>) -> Result<()>;
}

/// Counters gathered while drawing
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderReport {
    /// Glyph ids with the empty or unknown-glyph marker
    pub skipped_glyphs: usize,
    /// Device-space bounds of everything drawn
    pub ink_extents: Option<Rect>,
    pub layers: usize,
}

/// Result of `RenderContext::finish`
#[derive(Debug)]
pub struct Finished {
    pub report: RenderReport,
    /// The surface of a raster-bound context
    pub pixmap: Option<Pixmap>,
}

enum MaskOutcome {
    Coverage(Coverage),
    /// Nothing visible through the mask
    Hidden,
    /// The mask can't be used; draw unmasked
    Ignored,
}

pub struct RenderContext<'a> {
    phase: Phase,
    canvas: Option<Box<dyn Canvas + 'a>>,
    states: Vec<RenderState>,
    options: RenderOptions,
    report: RenderReport,
}

impl<'a> RenderContext<'a> {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            phase: Phase::Uninitialized,
            canvas: None,
            states: vec![RenderState::root(Affine::IDENTITY)],
            options,
            report: RenderReport::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding
    // ─────────────────────────────────────────────────────────────────────────

    fn bind(&mut self, canvas: Box<dyn Canvas + 'a>) -> Result<()> {
        match self.phase {
            Phase::Uninitialized => {}
            Phase::SurfaceBound => return Err(RenderError::AlreadyBound),
            Phase::Finished => return Err(RenderError::Finished),
        }
        self.canvas = Some(canvas);
        self.phase = Phase::SurfaceBound;
        Ok(())
    }

    /// Bind a new transparent raster surface
    pub fn bind_raster(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<()> {
        if self.phase != Phase::Uninitialized {
            return self.bind_error();
        }
        if width == 0 || height == 0 {
            return Err(RenderError::Bind(format!("empty raster surface {width}x{height}")));
        }
        self.bind(Box::new(RasterCanvas::new(width, height)?))?;
        if !format.has_alpha() {
            self.clear(Color::WHITE)?;
        }
        Ok(())
    }

    /// Bind one PDF page of `page` points written to `out`
    pub fn bind_page<W: Write + 'a>(&mut self, out: W, page: Size, level: PdfLevel) -> Result<()> {
        if self.phase != Phase::Uninitialized {
            return self.bind_error();
        }
        if !(page.width > 0.0 && page.height > 0.0) {
            return Err(RenderError::Bind(format!(
                "empty page {}x{}",
                page.width, page.height
            )));
        }
        self.options.pdf_level = level;
        let dpi = self.options.bitmap_dpi;
        self.bind(Box::new(PdfCanvas::new(Box::new(out), page, level, dpi)))
    }

    /// Bind a caller-owned pixmap; `matrix` maps device space onto it
    pub fn bind_surface(&mut self, pixmap: &'a mut Pixmap, matrix: Affine) -> Result<()> {
        if self.phase != Phase::Uninitialized {
            return self.bind_error();
        }
        self.bind(Box::new(RasterCanvas::borrowed(pixmap)))?;
        self.set_transform(matrix);
        Ok(())
    }

    fn bind_error(&self) -> Result<()> {
        Err(match self.phase {
            Phase::Finished => RenderError::Finished,
            _ => RenderError::AlreadyBound,
        })
    }

    fn canvas(&mut self) -> Result<&mut (dyn Canvas + 'a)> {
        match self.phase {
            Phase::SurfaceBound => {}
            Phase::Uninitialized => return Err(RenderError::NotBound),
            Phase::Finished => return Err(RenderError::Finished),
        }
        match self.canvas.as_deref_mut() {
            Some(canvas) => Ok(canvas),
            None => Err(RenderError::NotBound),
        }
    }

    pub fn is_vector(&self) -> bool {
        self.canvas.as_ref().is_some_and(|c| c.is_vector())
    }

    /// Device size of the bound surface
    pub fn surface_size(&self) -> Option<Size> {
        self.canvas.as_ref().map(|c| c.size())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State stack
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> &RenderState {
        // the root state is never popped
        &self.states[self.states.len() - 1]
    }

    pub fn state_mut(&mut self) -> &mut RenderState {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    pub fn depth(&self) -> usize {
        self.states.len() - 1
    }

    pub fn push_state(&mut self) -> Result<()> {
        self.canvas()?.save();
        let child = self.state().child();
        self.states.push(child);
        Ok(())
    }

    pub fn pop_state(&mut self) -> Result<()> {
        if self.states.len() <= 1 {
            return Err(RenderError::Unbalanced("pop_state without push_state"));
        }
        self.canvas()?.restore();
        self.states.pop();
        Ok(())
    }

    /// Replace the current user-to-device transform
    pub fn set_transform(&mut self, transform: Affine) {
        self.state_mut().transform = transform;
    }

    /// Prepend `transform` to the current one
    pub fn transform(&mut self, transform: &Affine) {
        let state = self.state_mut();
        state.transform = state.transform * *transform;
    }

    /// Intersect the clip with a rectangle in user space
    pub fn add_clipping_rect(&mut self, rect: Rect) -> Result<()> {
        let transform = self.state().transform;
        self.canvas()?.clip(&ClipRegion::rect(rect), &transform);
        Ok(())
    }

    /// Intersect the clip with `region` in user space
    pub fn add_clip_region(&mut self, region: &ClipRegion) -> Result<()> {
        let transform = self.state().transform;
        self.canvas()?.clip(region, &transform);
        Ok(())
    }

    /// Paint the whole surface
    pub fn clear(&mut self, color: Color) -> Result<()> {
        self.canvas()?.clear(color);
        Ok(())
    }

    fn note_ink(&mut self, bounds: Option<Rect>) {
        self.report.ink_extents = union_opt(self.report.ink_extents, bounds);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Layers
    // ─────────────────────────────────────────────────────────────────────────

    /// Redirect drawing into a new group
    pub fn push_layer(&mut self) -> Result<()> {
        self.canvas()?.begin_group();
        self.report.layers += 1;
        Ok(())
    }

    /// Composite the innermost group through the current state's opacity,
    /// clip and mask
    pub fn pop_layer(&mut self, content: &mut dyn SceneContent) -> Result<()> {
        let state = self.state().clone();
        let group = self
            .canvas()?
            .end_group()
            .ok_or(RenderError::Unbalanced("pop_layer without push_layer"))?;

        let clip = match state.clip_path {
            Some(id) => content.clip_region(id, state.bbox)?,
            None => None,
        };
        let mask = match state.mask {
            Some(id) => self.render_mask(id, &state, content)?,
            None => MaskOutcome::Ignored,
        };

        let vector = self.is_vector();
        let canvas = self.canvas()?;
        match (mask, clip) {
            (MaskOutcome::Hidden, _) => {}
            (MaskOutcome::Ignored, None) => canvas.paint_group(group, state.opacity, None),
            (MaskOutcome::Ignored, Some(clip)) if vector => {
                canvas.save();
                canvas.clip(&clip, &state.transform);
                canvas.paint_group(group, state.opacity, None);
                canvas.restore();
            }
            (MaskOutcome::Ignored, Some(clip)) => {
                let coverage = canvas
                    .mask_grid(None)
                    .and_then(|grid| Coverage::from_clip(&clip, &state.transform, &grid));
                canvas.paint_group(group, state.opacity, coverage.as_ref());
            }
            (MaskOutcome::Coverage(coverage), None) => canvas.paint_group(group, 1.0, Some(&coverage)),
            (MaskOutcome::Coverage(coverage), Some(clip)) if vector => {
                canvas.save();
                canvas.clip(&clip, &state.transform);
                canvas.paint_group(group, 1.0, Some(&coverage));
                canvas.restore();
            }
            (MaskOutcome::Coverage(mut coverage), Some(clip)) => {
                let grid = crate::mask::CoverageGrid {
                    width: coverage.width,
                    height: coverage.height,
                    to_device: coverage.to_device,
                };
                if let Some(clip) = Coverage::from_clip(&clip, &state.transform, &grid) {
                    coverage.multiply(&clip);
                }
                canvas.paint_group(group, 1.0, Some(&coverage));
            }
        }
        Ok(())
    }

    /// Render the mask's children off-screen and take their luminance
    fn render_mask(
        &mut self,
        id: MaskId,
        state: &RenderState,
        content: &mut dyn SceneContent,
    ) -> Result<MaskOutcome> {
        if !content.enter(Resource::Mask(id))? {
            tracing::warn!("mask {:?} references itself, ignored", id);
            return Ok(MaskOutcome::Ignored);
        }
        let result = self.render_mask_inner(id, state, content);
        content.leave(Resource::Mask(id));
        result
    }

    fn render_mask_inner(
        &mut self,
        id: MaskId,
        state: &RenderState,
        content: &mut dyn SceneContent,
    ) -> Result<MaskOutcome> {
        let Some(mask) = content.document().mask(id).cloned() else {
            tracing::warn!("unknown mask {:?}", id);
            return Ok(MaskOutcome::Ignored);
        };
        let bbox = state.bbox.filter(|b| b.width() > 0.0 && b.height() > 0.0);
        let region = match mask.units {
            Units::UserSpaceOnUse => mask.region,
            Units::ObjectBoundingBox => match bbox {
                Some(b) => mask.region.transform(&bbox_to_user(&b)),
                None => return Ok(MaskOutcome::Hidden),
            },
        };
        let device_bounds = region.transform(&state.transform);
        let Some(grid) = self.canvas()?.mask_grid(Some(device_bounds)) else {
            return Ok(MaskOutcome::Hidden);
        };
        let Some(to_grid) = grid.to_device.inverse() else {
            return Ok(MaskOutcome::Hidden);
        };

        let mut sub = RenderContext::new(self.options.clone());
        sub.bind_raster(grid.width, grid.height, PixelFormat::Argb32)?;
        sub.set_transform(to_grid * state.transform);
        sub.add_clipping_rect(region)?;
        if mask.content_units == Units::ObjectBoundingBox {
            match bbox {
                Some(b) => sub.transform(&bbox_to_user(&b)),
                None => return Ok(MaskOutcome::Hidden),
            }
        }
        content.render_children(&mask.children, &mut sub)?;
        let finished = sub.finish()?;
        let Some(pixmap) = finished.pixmap else {
            return Ok(MaskOutcome::Ignored);
        };
        Ok(MaskOutcome::Coverage(Coverage::from_luminance(
            &pixmap,
            state.opacity,
            grid.to_device,
        )))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Drawing
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether a leaf needs its own layer for the current state
    ///
    /// The tree walker pushes item layers itself and sets `need_layer`, so
    /// this only fires for callers that drive the context directly with an
    /// unmerged opacity, clip or mask.
    fn leaf_needs_layer(&self) -> bool {
        let s = self.state();
        !s.merge_opacity
            && !s.need_layer
            && (s.opacity < 1.0 || s.clip_path.is_some() || s.mask.is_some())
    }

    fn alpha_scale(&self) -> f32 {
        let s = self.state();
        if s.merge_opacity {
            s.opacity
        } else {
            1.0
        }
    }

    fn resolve(
        &mut self,
        paint: &vellum_core::Paint,
        role: PaintRole,
        bbox: Option<Rect>,
        alpha: f32,
        content: &mut dyn SceneContent,
    ) -> Result<Option<NativePaint>> {
        let mut tiles = ContextTiles {
            options: &self.options,
            device: self.state().transform,
            content,
        };
        paint::resolve_paint(paint, role, bbox, alpha, &mut tiles)
    }

    /// Fill then stroke `path` with `style`
    pub fn render_path(
        &mut self,
        path: &PathVector,
        style: &Style,
        bbox: Option<Rect>,
        content: &mut dyn SceneContent,
    ) -> Result<()> {
        self.canvas()?;
        if style.no_fill() && style.no_stroke() {
            return Ok(());
        }
        self.paint_shape(Shape::Path(path), style, bbox, content)
    }

    /// Draw a glyph run in the configured text mode
    pub fn render_glyphs(
        &mut self,
        run: &GlyphRun,
        style: &Style,
        bbox: Option<Rect>,
        content: &mut dyn SceneContent,
    ) -> Result<()> {
        self.canvas()?;
        let mut run = run.clone();
        let before = run.glyphs.len();
        run.glyphs.retain(|g| vellum_text::is_renderable(g.id));
        self.report.skipped_glyphs += before - run.glyphs.len();
        if run.glyphs.is_empty() || (style.no_fill() && style.no_stroke()) {
            return Ok(());
        }

        let vector = self.is_vector();
        match self.options.text_mode {
            TextMode::Omit if vector => Ok(()),
            TextMode::Embed if vector => self.paint_shape(Shape::Glyphs(&run), style, bbox, content),
            _ => {
                let outline = run.outline();
                self.paint_shape(Shape::Path(&outline), style, bbox, content)
            }
        }
    }

    fn paint_shape(
        &mut self,
        shape: Shape<'_>,
        style: &Style,
        bbox: Option<Rect>,
        content: &mut dyn SceneContent,
    ) -> Result<()> {
        let need_layer = self.leaf_needs_layer();
        if need_layer {
            self.push_layer()?;
        }
        let scale = self.alpha_scale();
        let transform = self.state().transform;

        if !style.no_fill() {
            let alpha = style.fill_opacity * scale;
            if let Some(paint) = self.resolve(&style.fill, PaintRole::Fill, bbox, alpha, content)? {
                let canvas = self.canvas()?;
                let ink = match shape {
                    Shape::Path(path) => {
                        canvas.fill(path, &transform, &paint, style.fill_rule);
                        path.bounds_with(&transform)
                    }
                    Shape::Glyphs(run) => {
                        if !canvas.show_glyphs(run, &transform, &paint) {
                            canvas.fill(&run.outline(), &transform, &paint, style.fill_rule);
                        }
                        run.outline().bounds_with(&transform)
                    }
                };
                self.note_ink(ink);
            }
        }

        if !style.no_stroke() {
            let alpha = style.stroke_opacity * scale;
            if let Some(paint) = self.resolve(&style.stroke, PaintRole::Stroke, bbox, alpha, content)? {
                let stroke = stroke_style(style);
                let outline;
                let path = match shape {
                    Shape::Path(path) => path,
                    Shape::Glyphs(run) => {
                        outline = run.outline();
                        &outline
                    }
                };
                self.canvas()?.stroke(path, &transform, &paint, &stroke);
                let half = style.stroke_width / 2.0;
                self.note_ink(path.bounds().map(|b| b.expand(half, half).transform(&transform)));
            }
        }

        if need_layer {
            self.pop_layer(content)?;
        }
        Ok(())
    }

    /// Draw `image` into the rectangle its pixel grid maps to under
    /// `image_transform`
    pub fn render_image(
        &mut self,
        image: &ImageData,
        image_transform: &Affine,
        style: &Style,
    ) -> Result<()> {
        let opacity = self.alpha_scale();
        let transform = self.state().transform * *image_transform;
        let bounds = Rect::new(0.0, 0.0, image.width() as f64, image.height() as f64);
        let canvas = self.canvas()?;
        if canvas.is_vector() {
            canvas.save();
            canvas.clip(&ClipRegion::rect(bounds), &transform);
            canvas.draw_image(image, &transform, opacity, style.image_rendering);
            canvas.restore();
        } else {
            canvas.draw_image(image, &transform, opacity, style.image_rendering);
        }
        self.note_ink(Some(bounds.transform(&transform)));
        Ok(())
    }

    /// Flush the surface; the context can't draw afterwards
    pub fn finish(&mut self) -> Result<Finished> {
        match self.phase {
            Phase::SurfaceBound => {}
            Phase::Uninitialized => return Err(RenderError::NotBound),
            Phase::Finished => return Err(RenderError::Finished),
        }
        if self.states.len() > 1 {
            tracing::warn!("{} render states still pushed at finish", self.states.len() - 1);
        }
        let canvas = self.canvas.take().ok_or(RenderError::NotBound)?;
        self.phase = Phase::Finished;
        let pixmap = canvas.finish()?;
        Ok(Finished {
            report: std::mem::take(&mut self.report),
            pixmap,
        })
    }
}

#[derive(Clone, Copy)]
enum Shape<'s> {
    Path(&'s PathVector),
    Glyphs(&'s GlyphRun),
}

pub(crate) fn stroke_style(style: &Style) -> StrokeStyle {
    StrokeStyle {
        width: style.stroke_width,
        cap: style.line_cap,
        join: style.line_join,
        miter_limit: style.miter_limit,
        dash: style.dash_array.clone(),
        dash_offset: style.dash_offset,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tile rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Renders pattern and hatch tiles in fresh raster contexts
struct ContextTiles<'c, 's> {
    options: &'c RenderOptions,
    device: Affine,
    content: &'c mut (dyn SceneContent + 's),
}

impl ContextTiles<'_, '_> {
    fn tile_context(&self, width: u32, height: u32) -> Result<RenderContext<'static>> {
        let mut sub = RenderContext::new(self.options.clone());
        sub.bind_raster(width, height, PixelFormat::Argb32)?;
        Ok(sub)
    }
}

impl TileSource for ContextTiles<'_, '_> {
    fn document(&self) -> &Document {
        self.content.document()
    }

    fn device_transform(&self) -> Affine {
        self.device
    }

    fn oversample(&self) -> f64 {
        self.options.tile_oversample
    }

    fn enter_server(&mut self, id: PaintServerId) -> Result<bool> {
        self.content.enter(Resource::Server(id))
    }

    fn leave_server(&mut self, id: PaintServerId) {
        self.content.leave(Resource::Server(id));
    }

    fn render_pattern(&mut self, plan: &PatternPlan) -> Result<Option<Arc<Pixmap>>> {
        let mut sub = self.tile_context(plan.width, plan.height)?;
        sub.set_transform(plan.content_to_pixel);
        self.content.render_children(&plan.children, &mut sub)?;
        Ok(sub.finish()?.pixmap.map(Arc::new))
    }

    fn render_hatch(&mut self, plan: &HatchPlan) -> Result<Option<Arc<Pixmap>>> {
        let mut sub = self.tile_context(plan.width, plan.height)?;
        for step in &plan.steps {
            sub.set_transform(*step);
            for stroke in &plan.strokes {
                let bbox = stroke.path.bounds();
                sub.render_path(&stroke.path, &stroke.style, bbox, self.content)?;
            }
        }
        Ok(sub.finish()?.pixmap.map(Arc::new))
    }
}
