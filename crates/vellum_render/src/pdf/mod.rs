//! Single-page PDF canvas
//!
//! Writes one page of vector output. There is no global coordinate change:
//! every transform handed to the canvas maps user space to a y-down device
//! space in points, and is composed with a flip into PDF's y-up page space
//! where it is emitted.
//!
//! - Fills and strokes: `q [gs] paint cm path op Q`
//! - Groups: transparency-group form XObjects painted with `Do`
//! - Opacity: ExtGState `ca`/`CA`; coverage: luminosity soft masks
//! - Gradients: shading patterns; tiles: tiling patterns over an image
//! - Text: Type 3 fonts
//!
//! PDF 1.3 has no transparency: alpha, groups' transparency attributes and
//! soft masks are dropped with a single warning.

mod content;
mod font;
mod shading;
mod writer;

use std::io::Write;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tiny_skia::Pixmap;
use vellum_core::{Affine, Color, FillRule, ImageRendering, PathVector, Rect, Size};
use vellum_image::ImageData;

use crate::canvas::{Canvas, ClipRegion, GlyphRun, GroupId, NativePaint, StrokeStyle};
use crate::error::Result;
use crate::mask::{Coverage, CoverageGrid};
use crate::options::PdfLevel;

pub use content::Content;
pub use writer::{ObjId, PdfWriter};

use font::Type3Fonts;
use shading::Channels;

/// Resource names shared by the page and every form on it
#[derive(Default)]
struct Resources {
    ext_gstates: IndexMap<String, ObjId>,
    alpha_states: FxHashMap<(u16, u16), String>,
    patterns: IndexMap<String, ObjId>,
    shadings: IndexMap<String, ObjId>,
    x_objects: IndexMap<String, ObjId>,
}

impl Resources {
    fn name(map: &mut IndexMap<String, ObjId>, prefix: &str, id: ObjId) -> String {
        let name = format!("{prefix}{}", map.len());
        map.insert(name.clone(), id);
        name
    }

    /// Existing name of `id`, or a new one
    fn name_for(map: &mut IndexMap<String, ObjId>, prefix: &str, id: ObjId) -> String {
        match map.iter().find(|(_, v)| **v == id) {
            Some((name, _)) => name.clone(),
            None => Self::name(map, prefix, id),
        }
    }

    fn dict(map: &IndexMap<String, ObjId>) -> String {
        map.iter()
            .map(|(name, id)| format!("/{name} {}", id.r()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub struct PdfCanvas<'a> {
    out: Box<dyn Write + 'a>,
    writer: PdfWriter,
    level: PdfLevel,
    page: Size,
    flip: Affine,
    /// Mask pixels per point
    mask_scale: f64,
    content: Content,
    groups: Vec<Content>,
    closed: Vec<Option<Content>>,
    resources: Resources,
    resources_id: ObjId,
    fonts: Type3Fonts,
    /// Written images by pixel buffer and interpolation
    images: Vec<(Arc<Vec<u8>>, bool, ObjId)>,
    tiles: Vec<(Arc<Pixmap>, ObjId)>,
    used_groups: bool,
    warned_transparency: bool,
}

/// Largest mask grid side, in samples
const MAX_MASK_SIDE: f64 = 16384.0;

impl<'a> PdfCanvas<'a> {
    /// Page of `page` points written to `out` on finish
    pub fn new(out: Box<dyn Write + 'a>, page: Size, level: PdfLevel, bitmap_dpi: f64) -> Self {
        let mut writer = PdfWriter::new();
        let resources_id = writer.alloc();
        Self {
            out,
            writer,
            level,
            page,
            flip: Affine::new(1.0, 0.0, 0.0, -1.0, 0.0, page.height),
            mask_scale: (bitmap_dpi / 72.0).max(0.01),
            content: Content::new(),
            groups: Vec::new(),
            closed: Vec::new(),
            resources: Resources::default(),
            resources_id,
            fonts: Type3Fonts::new(),
            images: Vec::new(),
            tiles: Vec::new(),
            used_groups: false,
            warned_transparency: false,
        }
    }

    fn current(&mut self) -> &mut Content {
        match self.groups.last_mut() {
            Some(group) => group,
            None => &mut self.content,
        }
    }

    fn device(&self, transform: &Affine) -> Affine {
        self.flip * *transform
    }

    fn transparency(&mut self) -> bool {
        if self.level.supports_transparency() {
            return true;
        }
        if !self.warned_transparency {
            tracing::warn!("PDF {} has no transparency; alpha and masks dropped", self.level.version());
            self.warned_transparency = true;
        }
        false
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    /// ExtGState for constant fill and stroke alpha
    fn alpha_state(&mut self, fill: f32, stroke: f32) -> Option<String> {
        if fill >= 1.0 && stroke >= 1.0 {
            return None;
        }
        if !self.transparency() {
            return None;
        }
        let key = (
            (fill.clamp(0.0, 1.0) * 1000.0).round() as u16,
            (stroke.clamp(0.0, 1.0) * 1000.0).round() as u16,
        );
        if let Some(name) = self.resources.alpha_states.get(&key) {
            return Some(name.clone());
        }
        let id = self.writer.add(format!(
            "<< /Type /ExtGState /ca {} /CA {} >>",
            writer::num(key.0 as f64 / 1000.0),
            writer::num(key.1 as f64 / 1000.0)
        ));
        let name = Resources::name(&mut self.resources.ext_gstates, "GS", id);
        self.resources.alpha_states.insert(key, name.clone());
        Some(name)
    }

    /// ExtGState with a luminosity soft mask drawn by `form`
    fn soft_mask_state(&mut self, form: ObjId) -> String {
        let id = self.writer.add(format!(
            "<< /Type /ExtGState /SMask << /Type /Mask /S /Luminosity /G {} >> >>",
            form.r()
        ));
        Resources::name(&mut self.resources.ext_gstates, "GS", id)
    }

    /// Page-sized form XObject
    fn form(&mut self, content: &[u8], group: Option<&str>) -> ObjId {
        let group = group
            .map(|g| format!(" /Group << /S /Transparency {g} >>"))
            .unwrap_or_default();
        let dict = format!(
            "/Type /XObject /Subtype /Form /BBox [0 0 {} {}] /Matrix [1 0 0 1 0 0]{group} /Resources {}",
            writer::num(self.page.width),
            writer::num(self.page.height),
            self.resources_id.r()
        );
        self.writer.add_stream(&dict, content)
    }

    /// RGB image with an alpha soft mask, from premultiplied pixels
    fn image_object(&mut self, pixels: &[u8], width: u32, height: u32, interpolate: bool) -> ObjId {
        let mut rgb = Vec::with_capacity(pixels.len() / 4 * 3);
        let mut alpha = Vec::with_capacity(pixels.len() / 4);
        for px in pixels.chunks_exact(4) {
            let a = px[3];
            let un = |c: u8| {
                if a == 0 {
                    0
                } else {
                    ((c as u16 * 255 + a as u16 / 2) / a as u16).min(255) as u8
                }
            };
            rgb.extend_from_slice(&[un(px[0]), un(px[1]), un(px[2])]);
            alpha.push(a);
        }
        let interpolate = if interpolate { " /Interpolate true" } else { "" };
        let smask = if alpha.iter().any(|a| *a < 255) {
            let id = self.writer.add_stream(
                &format!(
                    "/Type /XObject /Subtype /Image /Width {width} /Height {height} \
                     /ColorSpace /DeviceGray /BitsPerComponent 8{interpolate}"
                ),
                &alpha,
            );
            format!(" /SMask {}", id.r())
        } else {
            String::new()
        };
        self.writer.add_stream(
            &format!(
                "/Type /XObject /Subtype /Image /Width {width} /Height {height} \
                 /ColorSpace /DeviceRGB /BitsPerComponent 8{interpolate}{smask}"
            ),
            &rgb,
        )
    }

    fn cached_image(&mut self, image: &ImageData, interpolate: bool) -> ObjId {
        let shared = image.shared_pixels();
        if let Some((_, _, id)) = self
            .images
            .iter()
            .find(|(p, i, _)| Arc::ptr_eq(p, &shared) && *i == interpolate)
        {
            return *id;
        }
        let id = self.image_object(image.pixels(), image.width(), image.height(), interpolate);
        self.images.push((shared, interpolate, id));
        id
    }

    fn cached_tile(&mut self, pixmap: &Arc<Pixmap>) -> ObjId {
        if let Some((_, id)) = self.tiles.iter().find(|(p, _)| Arc::ptr_eq(p, pixmap)) {
            return *id;
        }
        let id = self.image_object(pixmap.data(), pixmap.width(), pixmap.height(), true);
        self.tiles.push((pixmap.clone(), id));
        id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Paint
    // ─────────────────────────────────────────────────────────────────────────

    /// Emit color, pattern and alpha selection for `paint`
    ///
    /// `extent` bounds the painted area in user space; repeating gradients
    /// are stitched across it.
    fn apply_paint(&mut self, paint: &NativePaint, transform: &Affine, stroke: bool, extent: Option<Rect>) {
        let alpha = |a: f32| if stroke { (1.0, a) } else { (a, 1.0) };
        match paint {
            NativePaint::Solid(c) => {
                let (fa, sa) = alpha(c.a);
                let gs = self.alpha_state(fa, sa);
                let cur = self.current();
                if let Some(gs) = gs {
                    cur.graphics_state(&gs);
                }
                if stroke {
                    cur.stroke_rgb(*c);
                } else {
                    cur.fill_rgb(*c);
                }
            }
            NativePaint::Linear(_) | NativePaint::Radial(_) => {
                let paint_to_user = paint.paint_to_user();
                let m = self.device(transform) * paint_to_user;
                let local = paint_to_user
                    .inverse()
                    .and_then(|inv| extent.map(|e| e.transform(&inv)));
                let (spec, stops) = match paint {
                    NativePaint::Linear(g) => (shading::linear(g, local), &g.stops),
                    NativePaint::Radial(g) => (shading::radial(g, local), &g.stops),
                    _ => return,
                };
                let pattern = self.writer.add(format!(
                    "<< /Type /Pattern /PatternType 2 /Shading {} /Matrix [{}] >>",
                    spec.dict(Channels::Rgb),
                    writer::matrix(&m)
                ));
                let name = Resources::name(&mut self.resources.patterns, "P", pattern);

                let mut states = Vec::new();
                match shading::uniform_alpha(stops) {
                    Some(a) => {
                        let (fa, sa) = alpha(a);
                        states.extend(self.alpha_state(fa, sa));
                    }
                    None if self.transparency() => {
                        let sh = self.writer.add(spec.dict(Channels::Alpha));
                        let sh_name = Resources::name(&mut self.resources.shadings, "Sh", sh);
                        let mut mask = Content::new();
                        mask.save();
                        mask.transform(&m);
                        mask.shading(&sh_name);
                        mask.restore();
                        let form = self.form(mask.as_bytes(), Some("/CS /DeviceGray"));
                        states.push(self.soft_mask_state(form));
                    }
                    None => {}
                }

                let cur = self.current();
                for gs in &states {
                    cur.graphics_state(gs);
                }
                if stroke {
                    cur.stroke_pattern(&name);
                } else {
                    cur.fill_pattern(&name);
                }
            }
            NativePaint::Tile(t) => {
                let image = self.cached_tile(&t.pixmap);
                let (sw, sh) = (t.pixmap.width() as f64, t.pixmap.height() as f64);
                let m = self.device(transform) * t.paint_to_user;
                let mut tile = Content::new();
                tile.save();
                tile.transform(&Affine::new(sw, 0.0, 0.0, -sh, 0.0, sh));
                tile.x_object("Im");
                tile.restore();
                let pattern = self.writer.add_stream(
                    &format!(
                        "/Type /Pattern /PatternType 1 /PaintType 1 /TilingType 1 \
                         /BBox [0 0 {w} {h}] /XStep {w} /YStep {h} /Matrix [{}] \
                         /Resources << /XObject << /Im {} >> >>",
                        writer::matrix(&m),
                        image.r(),
                        w = writer::num(sw),
                        h = writer::num(sh),
                    ),
                    tile.as_bytes(),
                );
                let name = Resources::name(&mut self.resources.patterns, "P", pattern);
                let (fa, sa) = alpha(t.opacity);
                let gs = self.alpha_state(fa, sa);
                let cur = self.current();
                if let Some(gs) = gs {
                    cur.graphics_state(&gs);
                }
                if stroke {
                    cur.stroke_pattern(&name);
                } else {
                    cur.fill_pattern(&name);
                }
            }
        }
    }

    /// Soft mask form drawing `coverage` as a gray image
    fn coverage_form(&mut self, coverage: &Coverage) -> ObjId {
        let (w, h) = (coverage.width, coverage.height);
        let image = self.writer.add_stream(
            &format!(
                "/Type /XObject /Subtype /Image /Width {w} /Height {h} \
                 /ColorSpace /DeviceGray /BitsPerComponent 8 /Interpolate true"
            ),
            &coverage.data,
        );
        let name = Resources::name(&mut self.resources.x_objects, "M", image);
        let mut content = Content::new();
        content.save();
        content.transform(
            &(self.flip * coverage.to_device * Affine::new(w as f64, 0.0, 0.0, -(h as f64), 0.0, h as f64)),
        );
        content.x_object(&name);
        content.restore();
        self.form(content.as_bytes(), Some("/CS /DeviceGray"))
    }

    fn clip_region(&mut self, region: &ClipRegion, m: &Affine) {
        if let Some(outer) = &region.within {
            self.clip_region(outer, m);
        }
        let cur = self.current();
        if region.shapes.is_empty() {
            cur.rect(0.0, 0.0, 0.0, 0.0);
            cur.clip(FillRule::NonZero);
            return;
        }
        let first = region.shapes[0].rule;
        let rule = if region.shapes.iter().all(|s| s.rule == first) {
            first
        } else {
            tracing::warn!("clip children mix fill rules; using nonzero");
            FillRule::NonZero
        };
        for shape in &region.shapes {
            cur.path(&shape.path, m);
        }
        cur.clip(rule);
    }
}

impl Canvas for PdfCanvas<'_> {
    fn is_vector(&self) -> bool {
        true
    }

    fn size(&self) -> Size {
        self.page
    }

    fn mask_grid(&self, device_bounds: Option<Rect>) -> Option<CoverageGrid> {
        let page = Rect::new(0.0, 0.0, self.page.width, self.page.height);
        let bounds = match device_bounds {
            Some(b) => b.intersect(&page)?,
            None => page,
        };
        let width = (bounds.width() * self.mask_scale).ceil().min(MAX_MASK_SIDE);
        let height = (bounds.height() * self.mask_scale).ceil().min(MAX_MASK_SIDE);
        if !(width >= 1.0 && height >= 1.0) {
            return None;
        }
        // the grid always spans the whole region, coarser when capped
        Some(CoverageGrid {
            width: width as u32,
            height: height as u32,
            to_device: Affine::translation(bounds.x(), bounds.y())
                * Affine::scale(bounds.width() / width, bounds.height() / height),
        })
    }

    fn save(&mut self) {
        self.current().save();
    }

    fn restore(&mut self) {
        self.current().restore();
    }

    fn clip(&mut self, region: &ClipRegion, transform: &Affine) {
        let m = self.device(transform);
        self.clip_region(region, &m);
    }

    fn clear(&mut self, color: Color) {
        let gs = self.alpha_state(color.a, 1.0);
        let (w, h) = (self.page.width, self.page.height);
        let cur = self.current();
        cur.save();
        if let Some(gs) = gs {
            cur.graphics_state(&gs);
        }
        cur.fill_rgb(color);
        cur.rect(0.0, 0.0, w, h);
        cur.fill(FillRule::NonZero);
        cur.restore();
    }

    fn fill(&mut self, path: &PathVector, transform: &Affine, paint: &NativePaint, rule: FillRule) {
        let m = self.device(transform);
        if paint.is_transparent() || path.is_empty() || m.determinant().abs() < 1e-12 {
            return;
        }
        self.current().save();
        self.apply_paint(paint, transform, false, path.bounds());
        let cur = self.current();
        cur.transform(&m);
        cur.path(path, &Affine::IDENTITY);
        cur.fill(rule);
        cur.restore();
    }

    fn stroke(&mut self, path: &PathVector, transform: &Affine, paint: &NativePaint, stroke: &StrokeStyle) {
        let m = self.device(transform);
        if paint.is_transparent() || path.is_empty() || m.determinant().abs() < 1e-12 {
            return;
        }
        let extent = path.bounds().map(|b| b.expand(stroke.width, stroke.width));
        self.current().save();
        self.apply_paint(paint, transform, true, extent);
        let cur = self.current();
        cur.transform(&m);
        cur.stroke_style(stroke);
        cur.path(path, &Affine::IDENTITY);
        cur.stroke();
        cur.restore();
    }

    fn draw_image(&mut self, image: &ImageData, transform: &Affine, opacity: f32, rendering: ImageRendering) {
        let (w, h) = (image.width() as f64, image.height() as f64);
        let m = self.device(transform) * Affine::new(w, 0.0, 0.0, -h, 0.0, h);
        if m.determinant().abs() < 1e-12 {
            return;
        }
        let id = self.cached_image(image, rendering != ImageRendering::OptimizeSpeed);
        let name = Resources::name_for(&mut self.resources.x_objects, "Im", id);
        let gs = self.alpha_state(opacity, opacity);
        let cur = self.current();
        cur.save();
        if let Some(gs) = gs {
            cur.graphics_state(&gs);
        }
        cur.transform(&m);
        cur.x_object(&name);
        cur.restore();
    }

    fn show_glyphs(&mut self, run: &GlyphRun, transform: &Affine, paint: &NativePaint) -> bool {
        let NativePaint::Solid(color) = paint else {
            return false;
        };
        if color.a <= 0.0 {
            return true;
        }
        let base = self.device(transform);
        let mut shown = Vec::with_capacity(run.glyphs.len());
        for glyph in &run.glyphs {
            if glyph.outline.is_none() {
                continue;
            }
            let slot = self
                .fonts
                .slot(&mut self.writer, run.font, run.units_per_em, run.size, glyph);
            let tm = base * Affine::new(run.size, 0.0, 0.0, -run.size, glyph.x, glyph.y);
            shown.push((slot, tm));
        }
        let gs = self.alpha_state(color.a, 1.0);
        let cur = self.current();
        cur.save();
        if let Some(gs) = gs {
            cur.graphics_state(&gs);
        }
        cur.fill_rgb(*color);
        for (slot, tm) in &shown {
            cur.glyph(&slot.font, slot.code, tm);
        }
        cur.restore();
        true
    }

    fn begin_group(&mut self) {
        self.groups.push(Content::new());
    }

    fn end_group(&mut self) -> Option<GroupId> {
        let content = self.groups.pop()?;
        self.closed.push(Some(content));
        Some(GroupId(self.closed.len() - 1))
    }

    fn paint_group(&mut self, group: GroupId, opacity: f32, coverage: Option<&Coverage>) {
        let Some(content) = self.closed.get_mut(group.0).and_then(Option::take) else {
            tracing::warn!("group {:?} painted twice", group);
            return;
        };
        let transparent = self.level.supports_transparency();
        let form = self.form(
            content.as_bytes(),
            transparent.then_some("/I true /CS /DeviceRGB"),
        );
        self.used_groups |= transparent;
        let name = Resources::name(&mut self.resources.x_objects, "X", form);

        let mut states: Vec<String> = self.alpha_state(opacity, opacity).into_iter().collect();
        if let Some(coverage) = coverage {
            if self.transparency() {
                let mask = self.coverage_form(coverage);
                states.push(self.soft_mask_state(mask));
            }
        }
        let cur = self.current();
        cur.save();
        for gs in &states {
            cur.graphics_state(gs);
        }
        cur.x_object(&name);
        cur.restore();
    }

    fn finish(self: Box<Self>) -> Result<Option<Pixmap>> {
        let mut this = *self;
        if !this.groups.is_empty() {
            tracing::warn!("{} groups still open at finish", this.groups.len());
        }

        let fonts = this.fonts.write(&mut this.writer);
        let font_dict = fonts
            .iter()
            .map(|(name, id)| format!("/{name} {}", id.r()))
            .collect::<Vec<_>>()
            .join(" ");
        let r = &this.resources;
        let resources = format!(
            "<< /ProcSet [/PDF /Text /ImageB /ImageC] /ExtGState << {} >> /Pattern << {} >> \
             /Shading << {} >> /XObject << {} >> /Font << {font_dict} >> >>",
            Resources::dict(&r.ext_gstates),
            Resources::dict(&r.patterns),
            Resources::dict(&r.shadings),
            Resources::dict(&r.x_objects),
        );
        this.writer.set(this.resources_id, resources);

        let contents = this.writer.add_stream("", this.content.as_bytes());
        let catalog = this.writer.alloc();
        let pages = this.writer.alloc();
        let group = if this.used_groups {
            " /Group << /S /Transparency /CS /DeviceRGB >>"
        } else {
            ""
        };
        let page = this.writer.add(format!(
            "<< /Type /Page /Parent {} /MediaBox [0 0 {} {}] /Resources {} /Contents {}{group} >>",
            pages.r(),
            writer::num(this.page.width),
            writer::num(this.page.height),
            this.resources_id.r(),
            contents.r()
        ));
        this.writer
            .set(pages, format!("<< /Type /Pages /Kids [{}] /Count 1 >>", page.r()));
        this.writer
            .set(catalog, format!("<< /Type /Catalog /Pages {} >>", pages.r()));
        let info = this.writer.add(format!(
            "<< /Producer {} >>",
            writer::text_string(concat!("vellum ", env!("CARGO_PKG_VERSION")))
        ));

        this.writer
            .write(&mut this.out, this.level.version(), catalog, Some(info))?;
        tracing::debug!("wrote PDF page with {} objects", this.writer.len());
        Ok(None)
    }
}
