//! Tree walker
//!
//! Walks the item tree from a root, pushing one render state per item and
//! dispatching leaves to the render context. The walker also answers the
//! context's document questions: clip geometry, pattern and mask children,
//! and reference-cycle bookkeeping.
//!
//! Traversal rules:
//! - invisible or non-printable items are skipped, siblings are not
//! - children paint in document order
//! - an item with opacity, a clip or a mask is drawn into a layer unless
//!   its opacity can be folded into a single paint
//! - every nested render (items, paint servers, clips, masks) counts
//!   towards the nesting limit

use std::io::Write;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tiny_skia::Pixmap;
use vellum_core::{
    Affine, BBoxKind, ClipPathId, Document, ImageItem, Item, ItemId, ItemKind, PathVector, Rect,
    Size, Style, TextRun, Units,
};
use vellum_image::{place_image, ImageData, ImageSource};
use vellum_text::FontCache;

use crate::canvas::{ClipRegion, ClipShape, GlyphRun, PlacedGlyph};
use crate::context::{RenderContext, Resource, SceneContent};
use crate::error::{RenderError, Result};
use crate::options::{ExportArea, ExportOptions, PdfLevel, PixelFormat};
use crate::paint::{self, bbox_to_user, MAX_TILE_SIZE};

/// Deepest nesting of items, paint servers, clips and masks
pub const MAX_NESTING: usize = 64;

/// Points per document unit (1/96 in)
const POINTS_PER_UNIT: f64 = 72.0 / 96.0;

/// Surface a render pass is bound to
pub enum Target<'a> {
    /// New raster surface sized from the export area
    Raster(PixelFormat),
    /// One PDF page written to `out`
    Page {
        out: Box<dyn Write + 'a>,
        level: PdfLevel,
    },
    /// Caller-owned pixmap; `matrix` maps device space onto it
    Surface {
        pixmap: &'a mut Pixmap,
        matrix: Affine,
    },
}

impl std::fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Raster(format) => f.debug_tuple("Raster").field(format).finish(),
            Target::Page { level, .. } => f.debug_struct("Page").field("level", level).finish(),
            Target::Surface { matrix, .. } => f.debug_struct("Surface").field("matrix", matrix).finish(),
        }
    }
}

/// Geometry chosen by `Renderer::setup_document`
#[derive(Clone, Debug, PartialEq)]
pub struct PageSetup {
    /// Item the pass starts from
    pub root: ItemId,
    /// Exported area in document units
    pub area: Rect,
    /// Device units per document unit
    pub scale: f64,
    /// Device size of the bound surface
    pub size: Size,
}

pub struct Renderer<'d> {
    doc: &'d Document,
    fonts: FontCache,
    images: FxHashMap<ItemId, Option<ImageData>>,
    /// Resources currently being rendered, outermost first
    active: Vec<Resource>,
    base_dir: Option<PathBuf>,
}

impl<'d> Renderer<'d> {
    pub fn new(doc: &'d Document) -> Self {
        Self {
            doc,
            fonts: FontCache::new(),
            images: FxHashMap::default(),
            active: Vec::new(),
            base_dir: None,
        }
    }

    /// Directory relative image paths are resolved against
    pub fn with_base_dir(mut self, base_dir: Option<&Path>) -> Self {
        self.base_dir = base_dir.map(Path::to_path_buf);
        self
    }

    pub fn fonts(&self) -> &FontCache {
        &self.fonts
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Setup
    // ─────────────────────────────────────────────────────────────────────────

    /// Choose the exported area, bind `ctx` to `target` and set the root
    /// transform
    ///
    /// The area is the page box grown by the bleed, or the visual bounds of
    /// the exported subtree. Opaque targets get their background here.
    pub fn setup_document<'a>(
        &mut self,
        ctx: &mut RenderContext<'a>,
        target: Target<'a>,
        export: &ExportOptions,
    ) -> Result<PageSetup> {
        let doc = self.doc;
        let root = match &export.export_id {
            Some(name) => doc
                .find(name)
                .ok_or_else(|| RenderError::InvalidExportId(name.clone()))?,
            None => doc.root(),
        };

        let area = match export.area {
            ExportArea::Page => doc.page_rect().expand(export.bleed, export.bleed),
            ExportArea::Drawing => doc.visual_bbox(root).ok_or(RenderError::EmptyDrawing)?,
        };
        if !(area.width() > 0.0 && area.height() > 0.0) {
            return Err(RenderError::EmptyDrawing);
        }

        let raster_scale = export.dpi / 96.0;
        if !(raster_scale > 0.0 && raster_scale.is_finite()) {
            return Err(RenderError::Bind(format!("invalid resolution {} dpi", export.dpi)));
        }

        let (scale, size) = match target {
            Target::Raster(format) => {
                let width = (area.width() * raster_scale).ceil().max(1.0) as u32;
                let height = (area.height() * raster_scale).ceil().max(1.0) as u32;
                ctx.bind_raster(width, height, format)?;
                (raster_scale, Size::new(width as f64, height as f64))
            }
            Target::Page { out, level } => {
                let page = Size::new(area.width() * POINTS_PER_UNIT, area.height() * POINTS_PER_UNIT);
                ctx.bind_page(out, page, level)?;
                (POINTS_PER_UNIT, page)
            }
            Target::Surface { pixmap, matrix } => {
                let size = Size::new(pixmap.width() as f64, pixmap.height() as f64);
                ctx.bind_surface(pixmap, matrix)?;
                (raster_scale, size)
            }
        };

        // ancestors of an exported item still position it
        let parent = doc
            .item(root)
            .and_then(Item::parent)
            .map(|p| doc.i2doc(p))
            .unwrap_or_default();
        ctx.transform(
            &(Affine::scale(scale, scale) * Affine::translation(-area.min_x(), -area.min_y()) * parent),
        );

        if let Some(background) = export.background {
            ctx.clear(background)?;
        }

        tracing::debug!(
            "export area {:?} at scale {} -> {}x{}",
            area,
            scale,
            size.width,
            size.height
        );
        Ok(PageSetup {
            root,
            area,
            scale,
            size,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Traversal
    // ─────────────────────────────────────────────────────────────────────────

    /// Render `id` and its subtree under the current state of `ctx`
    pub fn render_item(&mut self, ctx: &mut RenderContext<'_>, id: ItemId) -> Result<()> {
        let doc = self.doc;
        let Some(item) = doc.item(id) else {
            tracing::warn!("unknown item {:?} skipped", id);
            return Ok(());
        };
        if !item.is_rendered() {
            tracing::trace!("item {:?} hidden", id);
            return Ok(());
        }
        if !self.enter(Resource::Item(id))? {
            tracing::warn!("item {:?} references itself, skipped", id);
            return Ok(());
        }

        let result = ctx.push_state().and_then(|()| {
            let drawn = self.draw_item(ctx, id, item);
            let popped = ctx.pop_state();
            drawn.and(popped)
        });
        self.leave(Resource::Item(id));
        result
    }

    fn draw_item(&mut self, ctx: &mut RenderContext<'_>, id: ItemId, item: &'d Item) -> Result<()> {
        let style = &item.style;
        let opacity = style.opacity.clamp(0.0, 1.0);
        if opacity <= 0.0 {
            tracing::trace!("item {:?} fully transparent", id);
            return Ok(());
        }

        ctx.transform(&item.transform);
        let bbox = self.doc.bbox(id, &Affine::IDENTITY, BBoxKind::Geometric);
        let merge = ctx.options().merge_opacity && self.can_merge(item);
        let need_layer = !merge && (opacity < 1.0 || item.clip_path.is_some() || item.mask.is_some());
        {
            let state = ctx.state_mut();
            state.item_transform = item.transform;
            state.opacity = opacity;
            state.merge_opacity = merge;
            state.need_layer = need_layer;
            state.has_overflow = style.overflow_visible;
            state.clip_path = item.clip_path;
            state.mask = item.mask;
            state.bbox = bbox;
        }

        if need_layer {
            tracing::trace!("layer for item {:?}", id);
            ctx.push_layer()?;
        }
        if item.filtered && ctx.options().filters_to_bitmap {
            self.draw_filtered(ctx, id, item)?;
        } else {
            if item.filtered {
                tracing::debug!("filter on item {:?} not rendered", id);
            }
            self.draw_kind(ctx, id, item, bbox)?;
        }
        if need_layer {
            ctx.pop_layer(self)?;
        }
        Ok(())
    }

    /// Whether the item's opacity can go into a single paint's alpha
    fn can_merge(&self, item: &Item) -> bool {
        if item.clip_path.is_some() || item.mask.is_some() || item.filtered {
            return false;
        }
        let style = &item.style;
        match &item.kind {
            ItemKind::Path(_) | ItemKind::Text(_) => match (style.no_fill(), style.no_stroke()) {
                (false, true) => paint::is_mergeable(self.doc, &style.fill),
                (true, false) => paint::is_mergeable(self.doc, &style.stroke),
                (true, true) => true,
                // stroke over fill would show the fill through the stroke
                (false, false) => false,
            },
            ItemKind::Image(_) => true,
            ItemKind::Group(_) | ItemKind::Use(_) => false,
        }
    }

    fn draw_kind(
        &mut self,
        ctx: &mut RenderContext<'_>,
        id: ItemId,
        item: &'d Item,
        bbox: Option<Rect>,
    ) -> Result<()> {
        match &item.kind {
            ItemKind::Group(children) => {
                for child in children {
                    self.render_item(ctx, *child)?;
                }
                Ok(())
            }
            ItemKind::Path(data) => ctx.render_path(data, &item.style, bbox, self),
            ItemKind::Image(image) => self.draw_image(ctx, id, image, &item.style),
            ItemKind::Text(runs) => {
                for run in runs {
                    if let Some(glyphs) = self.glyph_run(run) {
                        ctx.render_glyphs(&glyphs, &item.style, bbox, self)?;
                    }
                }
                Ok(())
            }
            ItemKind::Use(clone) => {
                ctx.transform(&Affine::translation(clone.x, clone.y));
                self.render_item(ctx, clone.target)
            }
        }
    }

    fn draw_image(
        &mut self,
        ctx: &mut RenderContext<'_>,
        id: ItemId,
        image: &ImageItem,
        style: &Style,
    ) -> Result<()> {
        let Some(data) = self.image(id, image) else {
            return Ok(());
        };
        let placement = place_image(
            data.width(),
            data.height(),
            &image.rect,
            &image.aspect,
            style.overflow_visible,
        );
        match placement.clip {
            None => ctx.render_image(&data, &placement.transform, style),
            Some(clip) => {
                // keep this item's opacity for the image
                let state = ctx.state().clone();
                ctx.push_state()?;
                *ctx.state_mut() = state;
                let drawn = ctx
                    .add_clipping_rect(clip)
                    .and_then(|()| ctx.render_image(&data, &placement.transform, style));
                let popped = ctx.pop_state();
                drawn.and(popped)
            }
        }
    }

    /// Decoded pixels of an image item; failures are logged once
    fn image(&mut self, id: ItemId, image: &ImageItem) -> Option<ImageData> {
        let base_dir = self.base_dir.as_deref();
        self.images
            .entry(id)
            .or_insert_with(|| {
                let source = ImageSource::from_ref(&image.source, base_dir);
                match ImageData::load(&source) {
                    Ok(data) => Some(data),
                    Err(err) => {
                        tracing::warn!("image of item {:?} skipped: {}", id, err);
                        None
                    }
                }
            })
            .clone()
    }

    /// Glyphs of `run` with their outlines; `None` when the font is missing
    fn glyph_run(&mut self, run: &TextRun) -> Option<GlyphRun> {
        let doc = self.doc;
        let Some(face) = self.fonts.face(doc, run.font) else {
            tracing::warn!("font {:?} unavailable, text run skipped", run.font);
            return None;
        };
        let glyphs = run
            .glyphs
            .iter()
            .map(|g| PlacedGlyph {
                id: g.id,
                x: g.x,
                y: g.y,
                advance: g.advance,
                outline: vellum_text::is_renderable(g.id)
                    .then(|| self.fonts.outline(doc, run.font, g.id))
                    .flatten(),
            })
            .collect();
        Some(GlyphRun {
            font: run.font,
            units_per_em: face.units_per_em(),
            size: run.size,
            glyphs,
        })
    }

    /// Rasterize a filtered item at the bitmap resolution and draw the
    /// result as an image
    fn draw_filtered(&mut self, ctx: &mut RenderContext<'_>, id: ItemId, item: &'d Item) -> Result<()> {
        let Some(bounds) = self.doc.bbox(id, &Affine::IDENTITY, BBoxKind::Visual) else {
            return Ok(());
        };
        let options = ctx.options().clone();
        let expansion = self.doc.i2doc(id).expansion().max(f64::EPSILON);
        let mut scale = options.bitmap_dpi / 96.0 * expansion;
        let largest = bounds.width().max(bounds.height()) * scale;
        if largest > MAX_TILE_SIZE as f64 {
            scale *= MAX_TILE_SIZE as f64 / largest;
        }
        let width = (bounds.width() * scale).ceil() as u32;
        let height = (bounds.height() * scale).ceil() as u32;
        if width == 0 || height == 0 || !scale.is_finite() {
            return Ok(());
        }
        tracing::debug!("rasterizing filtered item {:?} at {}x{}", id, width, height);

        let mut sub = RenderContext::new(options);
        sub.bind_raster(width, height, PixelFormat::Argb32)?;
        sub.set_transform(
            Affine::scale(scale, scale) * Affine::translation(-bounds.min_x(), -bounds.min_y()),
        );
        self.draw_kind(&mut sub, id, item, self.doc.bbox(id, &Affine::IDENTITY, BBoxKind::Geometric))?;
        let Some(pixmap) = sub.finish()?.pixmap else {
            return Ok(());
        };
        let image = match ImageData::from_premultiplied(pixmap.take(), width, height) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!("filtered item {:?} skipped: {}", id, err);
                return Ok(());
            }
        };
        let placement =
            Affine::translation(bounds.min_x(), bounds.min_y()) * Affine::scale(1.0 / scale, 1.0 / scale);
        ctx.render_image(&image, &placement, &item.style)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Clip geometry
    // ─────────────────────────────────────────────────────────────────────────

    fn build_clip(&mut self, id: ClipPathId, bbox: Option<Rect>) -> Result<Option<ClipRegion>> {
        let doc = self.doc;
        let Some(clip) = doc.clip_path(id) else {
            tracing::warn!("unknown clip path {:?}", id);
            return Ok(None);
        };
        let to_user = match clip.units {
            Units::UserSpaceOnUse => clip.transform,
            Units::ObjectBoundingBox => match bbox.filter(|b| b.width() > 0.0 && b.height() > 0.0) {
                Some(b) => bbox_to_user(&b) * clip.transform,
                // nothing to size the clip against
                None => return Ok(Some(ClipRegion::default())),
            },
        };

        let mut region = ClipRegion::default();
        for child in &clip.children {
            self.clip_shapes(*child, &to_user, &mut region.shapes, 0)?;
        }
        if let Some(outer) = clip.clip_path {
            region.within = self.clip_region(outer, bbox)?.map(Box::new);
        }
        Ok(Some(region))
    }

    /// Geometry of `id` and its descendants, mapped by `parent`
    fn clip_shapes(
        &mut self,
        id: ItemId,
        parent: &Affine,
        out: &mut Vec<ClipShape>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_NESTING {
            return Err(RenderError::NestingTooDeep(MAX_NESTING));
        }
        let doc = self.doc;
        let Some(item) = doc.item(id) else {
            return Ok(());
        };
        if !item.visible {
            return Ok(());
        }
        if item.clip_path.is_some() {
            tracing::debug!("clip on clip child {:?} ignored", id);
        }
        let ts = *parent * item.transform;
        let rule = item.style.clip_rule;
        match &item.kind {
            ItemKind::Group(children) => {
                for child in children {
                    self.clip_shapes(*child, &ts, out, depth + 1)?;
                }
            }
            ItemKind::Path(data) => out.push(ClipShape {
                path: data.transform(&ts),
                rule,
            }),
            ItemKind::Image(image) => out.push(ClipShape {
                path: PathVector::rect(image.rect).transform(&ts),
                rule,
            }),
            ItemKind::Text(runs) => {
                for run in runs {
                    let outline = vellum_text::run_outline(&mut self.fonts, doc, run);
                    out.push(ClipShape {
                        path: outline.path.transform(&ts),
                        rule,
                    });
                }
            }
            ItemKind::Use(clone) => {
                if clone.target == id {
                    return Ok(());
                }
                let ts = ts * Affine::translation(clone.x, clone.y);
                self.clip_shapes(clone.target, &ts, out, depth + 1)?;
            }
        }
        Ok(())
    }
}

impl SceneContent for Renderer<'_> {
    fn document(&self) -> &Document {
        self.doc
    }

    fn enter(&mut self, resource: Resource) -> Result<bool> {
        if self.active.contains(&resource) {
            return Ok(false);
        }
        if self.active.len() >= MAX_NESTING {
            return Err(RenderError::NestingTooDeep(MAX_NESTING));
        }
        self.active.push(resource);
        Ok(true)
    }

    fn leave(&mut self, resource: Resource) {
        if let Some(pos) = self.active.iter().rposition(|r| *r == resource) {
            self.active.remove(pos);
        }
    }

    fn clip_region(&mut self, clip: ClipPathId, bbox: Option<Rect>) -> Result<Option<ClipRegion>> {
        if !self.enter(Resource::Clip(clip))? {
            tracing::warn!("clip path {:?} references itself, ignored", clip);
            return Ok(None);
        }
        let result = self.build_clip(clip, bbox);
        self.leave(Resource::Clip(clip));
        result
    }

    fn render_children(&mut self, items: &[ItemId], ctx: &mut RenderContext<'_>) -> Result<()> {
        for id in items {
            self.render_item(ctx, *id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RenderOptions;
    use vellum_core::{ClipPath, Color, Paint, UseItem};

    fn doc() -> Document {
        Document::new(Size::new(20.0, 20.0))
    }

    fn rect_item(rect: Rect, color: Color) -> Item {
        Item::path(PathVector::rect(rect), Style::filled(color))
    }

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let p = pixmap.pixel(x, y).unwrap();
        [p.red(), p.green(), p.blue(), p.alpha()]
    }

    fn render(doc: &Document, export: &ExportOptions) -> Pixmap {
        let mut ctx = RenderContext::new(export.render.clone());
        let mut renderer = Renderer::new(doc);
        let setup = renderer
            .setup_document(&mut ctx, Target::Raster(export.pixel_format), export)
            .unwrap();
        renderer.render_item(&mut ctx, setup.root).unwrap();
        ctx.finish().unwrap().pixmap.unwrap()
    }

    #[test]
    fn test_page_area_with_bleed() {
        let doc = doc();
        let export = ExportOptions {
            bleed: 5.0,
            ..Default::default()
        };
        let mut ctx = RenderContext::new(RenderOptions::default());
        let setup = Renderer::new(&doc)
            .setup_document(&mut ctx, Target::Raster(PixelFormat::Argb32), &export)
            .unwrap();
        assert_eq!(setup.area, Rect::new(-5.0, -5.0, 30.0, 30.0));
        assert_eq!(setup.size, Size::new(30.0, 30.0));
    }

    #[test]
    fn test_drawing_area_is_tight() {
        let mut doc = doc();
        let root = doc.root();
        doc.add_item(root, rect_item(Rect::new(4.0, 6.0, 8.0, 2.0), Color::RED))
            .unwrap();
        let export = ExportOptions {
            area: ExportArea::Drawing,
            dpi: 192.0,
            ..Default::default()
        };
        let mut ctx = RenderContext::new(RenderOptions::default());
        let setup = Renderer::new(&doc)
            .setup_document(&mut ctx, Target::Raster(PixelFormat::Argb32), &export)
            .unwrap();
        assert_eq!(setup.area, Rect::new(4.0, 6.0, 8.0, 2.0));
        assert_eq!(setup.size, Size::new(16.0, 4.0));
    }

    #[test]
    fn test_hidden_item_leaves_drawing_area() {
        let mut doc = Document::new(Size::new(1000.0, 1000.0));
        let root = doc.root();
        doc.add_item(root, rect_item(Rect::new(0.0, 0.0, 10.0, 10.0), Color::RED))
            .unwrap();
        let mut far = rect_item(Rect::new(990.0, 990.0, 10.0, 10.0), Color::BLUE);
        far.visible = false;
        doc.add_item(root, far).unwrap();

        let export = ExportOptions {
            area: ExportArea::Drawing,
            dpi: 96.0,
            ..Default::default()
        };
        let pixmap = render(&doc, &export);
        assert_eq!((pixmap.width(), pixmap.height()), (10, 10));
        assert_eq!(pixel(&pixmap, 5, 5), [255, 0, 0, 255]);
    }

    #[test]
    fn test_unknown_export_id_fails() {
        let doc = doc();
        let export = ExportOptions {
            export_id: Some("missing".into()),
            ..Default::default()
        };
        let mut ctx = RenderContext::new(RenderOptions::default());
        let err = Renderer::new(&doc)
            .setup_document(&mut ctx, Target::Raster(PixelFormat::Argb32), &export)
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidExportId(id) if id == "missing"));
    }

    #[test]
    fn test_empty_drawing_fails() {
        let doc = doc();
        let export = ExportOptions {
            area: ExportArea::Drawing,
            ..Default::default()
        };
        let mut ctx = RenderContext::new(RenderOptions::default());
        let err = Renderer::new(&doc)
            .setup_document(&mut ctx, Target::Raster(PixelFormat::Argb32), &export)
            .unwrap_err();
        assert!(matches!(err, RenderError::EmptyDrawing));
    }

    #[test]
    fn test_later_siblings_paint_over() {
        let mut doc = doc();
        let root = doc.root();
        doc.add_item(root, rect_item(Rect::new(0.0, 0.0, 20.0, 20.0), Color::RED))
            .unwrap();
        doc.add_item(root, rect_item(Rect::new(0.0, 0.0, 10.0, 20.0), Color::BLUE))
            .unwrap();
        let pixmap = render(&doc, &ExportOptions::default());
        assert_eq!(pixel(&pixmap, 5, 5), [0, 0, 255, 255]);
        assert_eq!(pixel(&pixmap, 15, 5), [255, 0, 0, 255]);
    }

    #[test]
    fn test_hidden_item_skipped() {
        let mut doc = doc();
        let root = doc.root();
        let mut item = rect_item(Rect::new(0.0, 0.0, 20.0, 20.0), Color::RED);
        item.visible = false;
        doc.add_item(root, item).unwrap();
        doc.add_item(root, rect_item(Rect::new(10.0, 0.0, 10.0, 20.0), Color::BLUE))
            .unwrap();
        let pixmap = render(&doc, &ExportOptions::default());
        assert_eq!(pixel(&pixmap, 5, 5)[3], 0);
        assert_eq!(pixel(&pixmap, 15, 5), [0, 0, 255, 255]);
    }

    #[test]
    fn test_rgb_target_has_white_background() {
        let doc = doc();
        let export = ExportOptions {
            pixel_format: PixelFormat::Rgb24,
            ..Default::default()
        };
        let pixmap = render(&doc, &export);
        assert_eq!(pixel(&pixmap, 3, 3), [255, 255, 255, 255]);
    }

    #[test]
    fn test_use_draws_translated_clone() {
        let mut doc = doc();
        let root = doc.root();
        let source = doc
            .add_item(root, rect_item(Rect::new(0.0, 0.0, 5.0, 5.0), Color::RED))
            .unwrap();
        doc.add_item(
            root,
            Item::new(ItemKind::Use(UseItem {
                target: source,
                x: 10.0,
                y: 10.0,
            })),
        )
        .unwrap();
        let pixmap = render(&doc, &ExportOptions::default());
        assert_eq!(pixel(&pixmap, 2, 2), [255, 0, 0, 255]);
        assert_eq!(pixel(&pixmap, 12, 12), [255, 0, 0, 255]);
        assert_eq!(pixel(&pixmap, 7, 7)[3], 0);
    }

    #[test]
    fn test_self_referencing_use_is_skipped() {
        let mut doc = doc();
        let root = doc.root();
        let group = doc.add_item(root, Item::group()).unwrap();
        doc.add_item(group, rect_item(Rect::new(0.0, 0.0, 5.0, 5.0), Color::RED))
            .unwrap();
        doc.add_item(
            group,
            Item::new(ItemKind::Use(UseItem {
                target: group,
                x: 10.0,
                y: 0.0,
            })),
        )
        .unwrap();
        let pixmap = render(&doc, &ExportOptions::default());
        assert_eq!(pixel(&pixmap, 2, 2), [255, 0, 0, 255]);
    }

    #[test]
    fn test_clip_rule_comes_from_clip_children() {
        let mut doc = doc();
        let root = doc.root();
        let mut ring = PathVector::rect(Rect::new(0.0, 0.0, 20.0, 20.0));
        ring.extend(PathVector::rect(Rect::new(5.0, 5.0, 10.0, 10.0)));
        let mut clip_child = Item::path(ring, Style::default());
        clip_child.style.clip_rule = vellum_core::FillRule::EvenOdd;
        let child = doc.add_detached(clip_child);
        let clip = doc.add_clip_path(ClipPath {
            children: vec![child],
            ..Default::default()
        });
        let mut item = rect_item(Rect::new(0.0, 0.0, 20.0, 20.0), Color::GREEN);
        item.clip_path = Some(clip);
        doc.add_item(root, item).unwrap();

        let pixmap = render(&doc, &ExportOptions::default());
        assert_eq!(pixel(&pixmap, 2, 2), [0, 255, 0, 255]);
        assert_eq!(pixel(&pixmap, 10, 10)[3], 0);
    }

    #[test]
    fn test_empty_clip_hides_everything() {
        let mut doc = doc();
        let root = doc.root();
        let clip = doc.add_clip_path(ClipPath::default());
        let mut item = rect_item(Rect::new(0.0, 0.0, 20.0, 20.0), Color::GREEN);
        item.clip_path = Some(clip);
        doc.add_item(root, item).unwrap();
        let pixmap = render(&doc, &ExportOptions::default());
        assert!(pixmap.pixels().iter().all(|p| p.alpha() == 0));
    }

    #[test]
    fn test_nesting_limit() {
        let mut doc = doc();
        let mut parent = doc.root();
        for _ in 0..MAX_NESTING + 1 {
            parent = doc.add_item(parent, Item::group()).unwrap();
        }
        let mut ctx = RenderContext::new(RenderOptions::default());
        let mut renderer = Renderer::new(&doc);
        let setup = renderer
            .setup_document(&mut ctx, Target::Raster(PixelFormat::Argb32), &ExportOptions::default())
            .unwrap();
        let err = renderer.render_item(&mut ctx, setup.root).unwrap_err();
        assert!(matches!(err, RenderError::NestingTooDeep(64)));
    }

    #[test]
    fn test_merge_requires_single_paint() {
        let doc = doc();
        let renderer = Renderer::new(&doc);
        let mut item = rect_item(Rect::new(0.0, 0.0, 1.0, 1.0), Color::RED);
        assert!(renderer.can_merge(&item));
        item.style.stroke = Paint::Color(Color::BLACK);
        assert!(!renderer.can_merge(&item));
        assert!(!renderer.can_merge(&Item::group()));
    }
}
