//! Output adapters
//!
//! Each adapter binds a render context to its target, runs one pass from the
//! export root and finalizes the output. This is the only layer that turns
//! a failed pass into an export error; partial output must be discarded.

use std::io::Write;
use std::path::Path;

use tiny_skia::Pixmap;
use vellum_core::{Affine, Document};
use vellum_image::{encode_png, PngChannels};

use crate::context::{Finished, RenderContext, RenderReport};
use crate::error::{RenderError, Result};
use crate::options::{ExportOptions, PixelFormat};
use crate::renderer::{PageSetup, Renderer, Target};

/// Run one pass from the export root into `target`
fn run<'a>(
    doc: &Document,
    base_dir: Option<&Path>,
    target: Target<'a>,
    options: &ExportOptions,
) -> Result<(PageSetup, Finished)> {
    let mut ctx = RenderContext::new(options.render.clone());
    let mut renderer = Renderer::new(doc).with_base_dir(base_dir);
    let setup = renderer.setup_document(&mut ctx, target, options)?;
    renderer.render_item(&mut ctx, setup.root)?;
    let finished = ctx.finish()?;
    tracing::debug!(
        "rendered {:?}: {} layers, {} skipped glyphs",
        setup.root,
        finished.report.layers,
        finished.report.skipped_glyphs
    );
    if finished.report.skipped_glyphs > 0 {
        tracing::warn!("{} glyphs without outlines skipped", finished.report.skipped_glyphs);
    }
    Ok((setup, finished))
}

// ─────────────────────────────────────────────────────────────────────────────
// Raster
// ─────────────────────────────────────────────────────────────────────────────

/// A rendered raster surface
#[derive(Debug)]
pub struct RasterOutput {
    pub pixmap: Pixmap,
    pub setup: PageSetup,
    pub report: RenderReport,
}

/// Renders into a new pixmap and encodes PNG
#[derive(Clone, Debug, Default)]
pub struct RasterExport {
    pub options: ExportOptions,
}

impl RasterExport {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    pub fn render(&self, doc: &Document, base_dir: Option<&Path>) -> Result<RasterOutput> {
        let target = Target::Raster(self.options.pixel_format);
        let (setup, finished) = run(doc, base_dir, target, &self.options)?;
        let pixmap = finished
            .pixmap
            .ok_or_else(|| RenderError::Bind("raster target returned no surface".into()))?;
        Ok(RasterOutput {
            pixmap,
            setup,
            report: finished.report,
        })
    }

    /// Render and write a PNG to `out`
    pub fn write_png<W: Write>(
        &self,
        doc: &Document,
        base_dir: Option<&Path>,
        out: W,
    ) -> Result<RenderReport> {
        let output = self.render(doc, base_dir)?;
        let channels = match self.options.pixel_format {
            PixelFormat::Argb32 => PngChannels::Rgba,
            PixelFormat::Rgb24 => PngChannels::Rgb,
            PixelFormat::A8 => PngChannels::Alpha,
        };
        encode_png(
            out,
            output.pixmap.data(),
            output.pixmap.width(),
            output.pixmap.height(),
            channels,
        )?;
        Ok(output.report)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PDF
// ─────────────────────────────────────────────────────────────────────────────

/// Writes a one-page PDF
#[derive(Clone, Debug, Default)]
pub struct PdfExport {
    pub options: ExportOptions,
}

impl PdfExport {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    /// Render, close the page and write the file trailer to `out`
    pub fn write<'w, W: Write + 'w>(
        &self,
        doc: &Document,
        base_dir: Option<&Path>,
        out: W,
    ) -> Result<RenderReport> {
        let target = Target::Page {
            out: Box::new(out),
            level: self.options.render.pdf_level,
        };
        let (_, finished) = run(doc, base_dir, target, &self.options)?;
        Ok(finished.report)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Print surface
// ─────────────────────────────────────────────────────────────────────────────

/// Draws into a caller-owned pixmap
///
/// The caller keeps the surface and decides what to do with it afterwards.
pub struct PrintSurface<'s> {
    pixmap: &'s mut Pixmap,
    matrix: Affine,
    options: ExportOptions,
}

impl<'s> PrintSurface<'s> {
    /// `matrix` maps device space onto the pixmap
    pub fn new(pixmap: &'s mut Pixmap, matrix: Affine, options: ExportOptions) -> Self {
        Self {
            pixmap,
            matrix,
            options,
        }
    }

    pub fn render(self, doc: &Document, base_dir: Option<&Path>) -> Result<RenderReport> {
        let target = Target::Surface {
            pixmap: self.pixmap,
            matrix: self.matrix,
        };
        let (_, finished) = run(doc, base_dir, target, &self.options)?;
        Ok(finished.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::{Color, Item, PathVector, Rect, Size, Style};

    fn red_square() -> Document {
        let mut doc = Document::new(Size::new(10.0, 10.0));
        let root = doc.root();
        doc.add_item(
            root,
            Item::path(PathVector::rect(Rect::new(0.0, 0.0, 10.0, 10.0)), Style::filled(Color::RED)),
        )
        .unwrap();
        doc
    }

    #[test]
    fn test_png_signature() {
        let mut out = Vec::new();
        RasterExport::default()
            .write_png(&red_square(), None, &mut out)
            .unwrap();
        assert_eq!(&out[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_pdf_has_one_page() {
        let mut out = Vec::new();
        PdfExport::default().write(&red_square(), None, &mut out).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.contains("/MediaBox [0 0 7.5 7.5]"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn test_print_surface_draws_in_place() {
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        let report = PrintSurface::new(&mut pixmap, Affine::translation(10.0, 10.0), ExportOptions::default())
            .render(&red_square(), None)
            .unwrap();
        assert!(report.ink_extents.is_some());
        assert_eq!(pixmap.pixel(5, 5).unwrap().alpha(), 0);
        assert_eq!(pixmap.pixel(15, 15).unwrap().red(), 255);
    }
}
