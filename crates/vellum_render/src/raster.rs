//! tiny-skia canvas
//!
//! Draws into an owned pixmap (PNG export, off-screen tiles and masks) or a
//! borrowed one (print surfaces). Groups are full-size transparent pixmaps
//! stacked on top of the base; clips are anti-aliased masks kept alongside
//! the save stack.

use tiny_skia::{BlendMode, FilterQuality, Mask, Pixmap, PixmapPaint, PixmapRef, Transform};
use vellum_core::{Affine, Color, FillRule, ImageRendering, PathVector, Rect, Size};
use vellum_image::ImageData;

use crate::canvas::{Canvas, ClipRegion, GroupId, NativePaint, StrokeStyle};
use crate::convert;
use crate::error::{RenderError, Result};
use crate::mask::{multiply_bytes, region_mask, Coverage, CoverageGrid};

enum Surface<'a> {
    Owned(Pixmap),
    Borrowed(&'a mut Pixmap),
}

impl Surface<'_> {
    fn pixmap(&self) -> &Pixmap {
        match self {
            Surface::Owned(p) => p,
            Surface::Borrowed(p) => p,
        }
    }

    fn pixmap_mut(&mut self) -> &mut Pixmap {
        match self {
            Surface::Owned(p) => p,
            Surface::Borrowed(p) => p,
        }
    }
}

pub struct RasterCanvas<'a> {
    base: Surface<'a>,
    /// Open groups, innermost last
    layers: Vec<Pixmap>,
    /// Closed groups waiting for `paint_group`
    closed: Vec<Option<Pixmap>>,
    /// Clip per save level; `None` is unclipped
    clips: Vec<Option<Mask>>,
}

impl<'a> RasterCanvas<'a> {
    /// Transparent canvas of `width` x `height` pixels
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RenderError::Bind(format!("cannot allocate a {width}x{height} pixmap"))
        })?;
        Ok(Self::with_surface(Surface::Owned(pixmap)))
    }

    /// Canvas drawing into a caller-owned pixmap
    pub fn borrowed(pixmap: &'a mut Pixmap) -> Self {
        Self::with_surface(Surface::Borrowed(pixmap))
    }

    fn with_surface(base: Surface<'a>) -> Self {
        Self {
            base,
            layers: Vec::new(),
            closed: Vec::new(),
            clips: vec![None],
        }
    }

    fn width(&self) -> u32 {
        self.base.pixmap().width()
    }

    fn height(&self) -> u32 {
        self.base.pixmap().height()
    }

    /// Current drawing target and clip
    fn target(&mut self) -> (&mut Pixmap, Option<&Mask>) {
        let clip = self.clips.last().and_then(|c| c.as_ref());
        let pixmap = match self.layers.last_mut() {
            Some(layer) => layer,
            None => self.base.pixmap_mut(),
        };
        (pixmap, clip)
    }
}

impl Canvas for RasterCanvas<'_> {
    fn is_vector(&self) -> bool {
        false
    }

    fn size(&self) -> Size {
        Size::new(self.width() as f64, self.height() as f64)
    }

    fn mask_grid(&self, _device_bounds: Option<Rect>) -> Option<CoverageGrid> {
        Some(CoverageGrid {
            width: self.width(),
            height: self.height(),
            to_device: Affine::IDENTITY,
        })
    }

    fn save(&mut self) {
        let top = self.clips.last().cloned().flatten();
        self.clips.push(top);
    }

    fn restore(&mut self) {
        if self.clips.len() > 1 {
            self.clips.pop();
        } else {
            tracing::warn!("raster canvas restore without save");
        }
    }

    fn clip(&mut self, region: &ClipRegion, transform: &Affine) {
        let (w, h) = (self.width(), self.height());
        let Some(mut mask) = region_mask(region, transform, w, h) else {
            return;
        };
        if let Some(Some(current)) = self.clips.last() {
            multiply_bytes(mask.data_mut(), current.data());
        }
        if let Some(top) = self.clips.last_mut() {
            *top = Some(mask);
        }
    }

    fn clear(&mut self, color: Color) {
        let (pixmap, _) = self.target();
        pixmap.fill(convert::color(color));
    }

    fn fill(&mut self, path: &PathVector, transform: &Affine, paint: &NativePaint, rule: FillRule) {
        let Some(path) = convert::path(path) else { return };
        let Some(shader) = convert::shader(paint) else {
            tracing::debug!("paint has no shader, fill skipped");
            return;
        };
        let paint = tiny_skia::Paint {
            shader,
            anti_alias: true,
            ..tiny_skia::Paint::default()
        };
        let ts = convert::transform(transform);
        let (pixmap, clip) = self.target();
        pixmap.fill_path(&path, &paint, convert::fill_rule(rule), ts, clip);
    }

    fn stroke(&mut self, path: &PathVector, transform: &Affine, paint: &NativePaint, stroke: &StrokeStyle) {
        let Some(path) = convert::path(path) else { return };
        let Some(shader) = convert::shader(paint) else { return };
        let paint = tiny_skia::Paint {
            shader,
            anti_alias: true,
            ..tiny_skia::Paint::default()
        };
        let stroke = convert::stroke(stroke);
        let ts = convert::transform(transform);
        let (pixmap, clip) = self.target();
        pixmap.stroke_path(&path, &paint, &stroke, ts, clip);
    }

    fn draw_image(&mut self, image: &ImageData, transform: &Affine, opacity: f32, rendering: ImageRendering) {
        let Some(src) = PixmapRef::from_bytes(image.pixels(), image.width(), image.height()) else {
            tracing::warn!("image {}x{} has no pixels", image.width(), image.height());
            return;
        };
        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            blend_mode: BlendMode::SourceOver,
            quality: convert::filter_quality(rendering),
        };
        let ts = convert::transform(transform);
        let (pixmap, clip) = self.target();
        pixmap.draw_pixmap(0, 0, src, &paint, ts, clip);
    }

    fn begin_group(&mut self) {
        match Pixmap::new(self.width(), self.height()) {
            Some(layer) => self.layers.push(layer),
            None => tracing::error!("cannot allocate group layer"),
        }
    }

    fn end_group(&mut self) -> Option<GroupId> {
        let layer = self.layers.pop()?;
        self.closed.push(Some(layer));
        Some(GroupId(self.closed.len() - 1))
    }

    fn paint_group(&mut self, group: GroupId, opacity: f32, coverage: Option<&Coverage>) {
        let Some(layer) = self.closed.get_mut(group.0).and_then(Option::take) else {
            tracing::warn!("group {:?} painted twice", group);
            return;
        };
        let (w, h) = (self.width(), self.height());

        let mut mask = match coverage {
            Some(cov) if cov.width == w && cov.height == h => cov.to_mask(),
            Some(cov) => {
                tracing::warn!(
                    "coverage {}x{} does not match canvas {}x{}",
                    cov.width,
                    cov.height,
                    w,
                    h
                );
                None
            }
            None => None,
        };
        if let Some(Some(clip)) = self.clips.last() {
            match &mut mask {
                Some(m) => multiply_bytes(m.data_mut(), clip.data()),
                None => mask = Some(clip.clone()),
            }
        }

        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            blend_mode: BlendMode::SourceOver,
            quality: FilterQuality::Nearest,
        };
        let pixmap = match self.layers.last_mut() {
            Some(layer) => layer,
            None => self.base.pixmap_mut(),
        };
        pixmap.draw_pixmap(0, 0, layer.as_ref(), &paint, Transform::identity(), mask.as_ref());
    }

    fn finish(self: Box<Self>) -> Result<Option<Pixmap>> {
        if !self.layers.is_empty() {
            tracing::warn!("{} groups still open at finish", self.layers.len());
        }
        match self.base {
            Surface::Owned(pixmap) => Ok(Some(pixmap)),
            Surface::Borrowed(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::Color;

    fn square() -> PathVector {
        PathVector::rect(Rect::new(0.0, 0.0, 10.0, 10.0))
    }

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let p = pixmap.pixel(x, y).unwrap();
        [p.red(), p.green(), p.blue(), p.alpha()]
    }

    #[test]
    fn test_fill_solid() {
        let mut canvas = RasterCanvas::new(10, 10).unwrap();
        canvas.fill(&square(), &Affine::IDENTITY, &NativePaint::Solid(Color::RED), FillRule::NonZero);
        let pixmap = Box::new(canvas).finish().unwrap().unwrap();
        assert_eq!(pixel(&pixmap, 5, 5), [255, 0, 0, 255]);
    }

    #[test]
    fn test_group_opacity() {
        let mut canvas = RasterCanvas::new(10, 10).unwrap();
        canvas.begin_group();
        canvas.fill(&square(), &Affine::IDENTITY, &NativePaint::Solid(Color::BLUE), FillRule::NonZero);
        let group = canvas.end_group().unwrap();
        canvas.paint_group(group, 0.5, None);
        let pixmap = Box::new(canvas).finish().unwrap().unwrap();
        let a = pixel(&pixmap, 5, 5)[3];
        assert!((127..=128).contains(&a), "alpha {a}");
    }

    #[test]
    fn test_clip_restored() {
        let mut canvas = RasterCanvas::new(10, 10).unwrap();
        canvas.save();
        canvas.clip(&ClipRegion::rect(Rect::new(0.0, 0.0, 5.0, 10.0)), &Affine::IDENTITY);
        canvas.fill(&square(), &Affine::IDENTITY, &NativePaint::Solid(Color::RED), FillRule::NonZero);
        canvas.restore();
        canvas.fill(
            &PathVector::rect(Rect::new(0.0, 0.0, 10.0, 1.0)),
            &Affine::IDENTITY,
            &NativePaint::Solid(Color::GREEN),
            FillRule::NonZero,
        );
        let pixmap = Box::new(canvas).finish().unwrap().unwrap();
        assert_eq!(pixel(&pixmap, 2, 5)[3], 255);
        assert_eq!(pixel(&pixmap, 7, 5)[3], 0);
        assert_eq!(pixel(&pixmap, 7, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn test_borrowed_surface_keeps_pixels() {
        let mut pixmap = Pixmap::new(4, 4).unwrap();
        {
            let mut canvas = RasterCanvas::borrowed(&mut pixmap);
            canvas.clear(Color::WHITE);
            assert!(Box::new(canvas).finish().unwrap().is_none());
        }
        assert_eq!(pixel(&pixmap, 0, 0), [255, 255, 255, 255]);
    }
}
