//! Font faces and glyph outline extraction

use std::sync::Arc;

use rustc_hash::FxHashMap;
use ttf_parser::{GlyphId, OutlineBuilder};
use vellum_core::{OutlineGlyph, PathBuilder, PathVector, Rect};

use crate::{Result, TextError};

/// Vertical font metrics in font units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub units_per_em: f64,
    pub ascent: f64,
    pub descent: f64,
}

enum FaceData {
    OpenType { data: Arc<Vec<u8>>, index: u32 },
    Outlines(FxHashMap<u32, OutlineGlyph>),
}

/// A parsed font face
pub struct FontFace {
    data: FaceData,
    metrics: FontMetrics,
    glyph_count: u32,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("metrics", &self.metrics)
            .field("glyph_count", &self.glyph_count)
            .finish()
    }
}

impl FontFace {
    /// Parse OpenType/TrueType data
    pub fn from_data(data: Arc<Vec<u8>>, index: u32) -> Result<Self> {
        let face = ttf_parser::Face::parse(&data, index)
            .map_err(|e| TextError::FontParseError(e.to_string()))?;
        let metrics = FontMetrics {
            units_per_em: face.units_per_em() as f64,
            ascent: face.ascender() as f64,
            descent: face.descender() as f64,
        };
        let glyph_count = face.number_of_glyphs() as u32;
        Ok(Self {
            data: FaceData::OpenType { data, index },
            metrics,
            glyph_count,
        })
    }

    /// Face backed by a table of outline glyphs (y pointing up)
    pub fn from_outlines(
        units_per_em: f64,
        ascent: f64,
        descent: f64,
        glyphs: FxHashMap<u32, OutlineGlyph>,
    ) -> Result<Self> {
        if units_per_em <= 0.0 {
            return Err(TextError::InvalidFontData);
        }
        let glyph_count = glyphs.keys().max().map(|m| m + 1).unwrap_or(0);
        Ok(Self {
            data: FaceData::Outlines(glyphs),
            metrics: FontMetrics {
                units_per_em,
                ascent,
                descent,
            },
            glyph_count,
        })
    }

    pub fn metrics(&self) -> FontMetrics {
        self.metrics
    }

    pub fn units_per_em(&self) -> f64 {
        self.metrics.units_per_em
    }

    pub fn glyph_count(&self) -> u32 {
        self.glyph_count
    }

    /// Glyph outline in font units, `None` for blank or unknown glyphs
    pub fn outline(&self, glyph: u32) -> Option<PathVector> {
        match &self.data {
            FaceData::OpenType { data, index } => {
                let face = ttf_parser::Face::parse(data, *index).ok()?;
                let gid = GlyphId(u16::try_from(glyph).ok()?);
                let mut sink = OutlineSink::default();
                face.outline_glyph(gid, &mut sink)?;
                Some(sink.finish())
            }
            FaceData::Outlines(glyphs) => glyphs
                .get(&glyph)
                .filter(|g| !g.path.is_empty())
                .map(|g| g.path.clone()),
        }
    }

    /// Horizontal advance in font units
    pub fn advance(&self, glyph: u32) -> Option<f64> {
        match &self.data {
            FaceData::OpenType { data, index } => {
                let face = ttf_parser::Face::parse(data, *index).ok()?;
                let gid = GlyphId(u16::try_from(glyph).ok()?);
                face.glyph_hor_advance(gid).map(f64::from)
            }
            FaceData::Outlines(glyphs) => glyphs.get(&glyph).map(|g| g.advance),
        }
    }

    /// Outline bounds in font units
    pub fn glyph_bounds(&self, glyph: u32) -> Option<Rect> {
        self.outline(glyph).and_then(|p| p.bounds())
    }
}

/// Collects ttf-parser outline callbacks into a path vector
#[derive(Default)]
struct OutlineSink {
    builder: PathBuilder,
}

impl OutlineSink {
    fn update(&mut self, f: impl FnOnce(PathBuilder) -> PathBuilder) {
        let builder = std::mem::take(&mut self.builder);
        self.builder = f(builder);
    }

    fn finish(self) -> PathVector {
        self.builder.build()
    }
}

impl OutlineBuilder for OutlineSink {
    fn move_to(&mut self, x: f32, y: f32) {
        self.update(|b| b.move_to(x as f64, y as f64));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.update(|b| b.line_to(x as f64, y as f64));
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.update(|b| b.quad_to(x1 as f64, y1 as f64, x as f64, y as f64));
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.update(|b| {
            b.cubic_to(
                x1 as f64, y1 as f64, x2 as f64, y2 as f64, x as f64, y as f64,
            )
        });
    }

    fn close(&mut self) {
        self.update(PathBuilder::close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::Rect;

    fn square_font() -> FontFace {
        let mut glyphs = FxHashMap::default();
        glyphs.insert(
            1,
            OutlineGlyph {
                path: PathVector::rect(Rect::new(100.0, 0.0, 800.0, 700.0)),
                advance: 1000.0,
            },
        );
        glyphs.insert(
            2,
            OutlineGlyph {
                path: PathVector::new(),
                advance: 500.0,
            },
        );
        FontFace::from_outlines(1000.0, 800.0, -200.0, glyphs).unwrap()
    }

    #[test]
    fn test_outline_lookup() {
        let face = square_font();
        assert_eq!(face.glyph_count(), 3);
        assert_eq!(
            face.glyph_bounds(1),
            Some(Rect::new(100.0, 0.0, 800.0, 700.0))
        );
        // space-like glyph: advance but no outline
        assert!(face.outline(2).is_none());
        assert_eq!(face.advance(2), Some(500.0));
        assert!(face.outline(7).is_none());
    }

    #[test]
    fn test_invalid_opentype_data() {
        let err = FontFace::from_data(Arc::new(vec![0, 1, 2, 3]), 0).unwrap_err();
        assert!(matches!(err, TextError::FontParseError(_)));
    }
}
