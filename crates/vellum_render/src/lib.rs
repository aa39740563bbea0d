//! Vellum Render
//!
//! Flattens a Vellum document into drawing commands for a raster surface or
//! a PDF page.
//!
//! # Modules
//!
//! - `paint`: resolves fills and strokes (colors, gradients, pattern and
//!   hatch tiles) against an object bounding box
//! - `context`: the render context, its state stack, layers, clips and masks
//! - `renderer`: the tree walker and export setup
//! - `raster` / `pdf`: tiny-skia and PDF canvases
//! - `export`: PNG, PDF and print-surface adapters

pub mod canvas;
pub mod context;
mod convert;
pub mod error;
pub mod export;
pub mod mask;
pub mod options;
pub mod paint;
pub mod pdf;
pub mod raster;
pub mod renderer;

pub use canvas::{Canvas, ClipRegion, ClipShape, GlyphRun, NativePaint, PlacedGlyph};
pub use context::{Finished, Phase, RenderContext, RenderReport, RenderState, Resource, SceneContent};
pub use error::{RenderError, Result};
pub use export::{PdfExport, PrintSurface, RasterExport, RasterOutput};
pub use options::{ExportArea, ExportOptions, PdfLevel, PixelFormat, RenderOptions, TextMode};
pub use paint::{resolve_paint, PaintRole};
pub use renderer::{PageSetup, Renderer, Target, MAX_NESTING};

pub use tiny_skia::Pixmap;
