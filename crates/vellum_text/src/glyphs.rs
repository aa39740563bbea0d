//! Glyph runs: placement transforms and outline assembly

use vellum_core::{Affine, Document, PathVector, Rect, TextRun};

use crate::cache::FontCache;

/// Glyph index the shaper emits for "no glyph"
pub const EMPTY_GLYPH: u32 = 0x0FFF_FFFF;

/// Flag bit marking a glyph the shaper could not map
pub const UNKNOWN_GLYPH_FLAG: u32 = 0x1000_0000;

/// Whether a glyph index refers to a real glyph
pub fn is_renderable(id: u32) -> bool {
    id != EMPTY_GLYPH && id & UNKNOWN_GLYPH_FLAG == 0
}

/// Maps font units (y up) to item space for a glyph at `(x, y)`
pub fn glyph_transform(units_per_em: f64, size: f64, x: f64, y: f64) -> Affine {
    let s = size / units_per_em;
    Affine::new(s, 0.0, 0.0, -s, x, y)
}

/// Outline of a whole run in item space
#[derive(Debug, Default)]
pub struct RunOutline {
    pub path: PathVector,
    /// Glyphs dropped for sentinel or unknown-flag indices
    pub skipped: usize,
}

/// Concatenate the outlines of every renderable glyph in `run`
pub fn run_outline(cache: &mut FontCache, doc: &Document, run: &TextRun) -> RunOutline {
    let mut out = RunOutline::default();
    let Some(face) = cache.face(doc, run.font) else {
        return out;
    };
    let upem = face.units_per_em();

    for glyph in &run.glyphs {
        if !is_renderable(glyph.id) {
            out.skipped += 1;
            continue;
        }
        let Some(outline) = cache.outline(doc, run.font, glyph.id) else {
            continue;
        };
        let ts = glyph_transform(upem, run.size, glyph.x, glyph.y);
        out.path.extend(outline.transform(&ts));
    }
    out
}

/// Bounds of the glyph outlines of `run` after `transform`
pub fn run_bounds(cache: &mut FontCache, doc: &Document, run: &TextRun, transform: &Affine) -> Option<Rect> {
    run_outline(cache, doc, run).path.bounds_with(transform)
}
