//! Per-export font cache
//!
//! Maps document font handles to parsed faces and memoizes glyph outlines.
//! Insertion-only: nothing is evicted while an export runs. Failed lookups
//! are cached too so a missing font is reported once.

use std::sync::Arc;

use fontdb::{Database, Family, Query, Source, Stretch, Style, Weight};
use rustc_hash::FxHashMap;
use vellum_core::{Document, FontId, FontSource, PathVector};

use crate::face::FontFace;
use crate::{Result, TextError};

/// Font faces and glyph outlines for one export session
#[derive(Default)]
pub struct FontCache {
    /// System font database, loaded on first use
    system: Option<Database>,
    faces: FxHashMap<FontId, Option<Arc<FontFace>>>,
    outlines: FxHashMap<(FontId, u32), Option<Arc<PathVector>>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of faces resolved so far (including failures)
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Face for `font`, `None` when it can't be loaded
    pub fn face(&mut self, doc: &Document, font: FontId) -> Option<Arc<FontFace>> {
        if let Some(cached) = self.faces.get(&font) {
            return cached.clone();
        }
        let loaded = match doc.font(font) {
            Some(source) => match self.load(source) {
                Ok(face) => Some(Arc::new(face)),
                Err(e) => {
                    tracing::warn!("Font {:?} unavailable: {}", font, e);
                    None
                }
            },
            None => {
                tracing::warn!("Font {:?} is not part of the document", font);
                None
            }
        };
        self.faces.insert(font, loaded.clone());
        loaded
    }

    /// Glyph outline in font units
    pub fn outline(&mut self, doc: &Document, font: FontId, glyph: u32) -> Option<Arc<PathVector>> {
        if let Some(cached) = self.outlines.get(&(font, glyph)) {
            return cached.clone();
        }
        let outline = self
            .face(doc, font)
            .and_then(|face| face.outline(glyph))
            .map(Arc::new);
        self.outlines.insert((font, glyph), outline.clone());
        outline
    }

    fn load(&mut self, source: &FontSource) -> Result<FontFace> {
        match source {
            FontSource::File { path, index } => {
                let data = std::fs::read(path).map_err(|e| {
                    TextError::FontLoadError(format!("Failed to read font file {path}: {e}"))
                })?;
                FontFace::from_data(Arc::new(data), *index)
            }
            FontSource::Bytes { data, index } => FontFace::from_data(Arc::clone(data), *index),
            FontSource::System { family } => self.load_system(family),
            FontSource::Outlines {
                units_per_em,
                ascent,
                descent,
                glyphs,
            } => FontFace::from_outlines(*units_per_em, *ascent, *descent, glyphs.clone()),
        }
    }

    fn load_system(&mut self, family: &str) -> Result<FontFace> {
        let db = self.system.get_or_insert_with(|| {
            let mut db = Database::new();
            db.load_system_fonts();
            tracing::debug!("Loaded {} system font faces", db.len());
            db
        });

        let query = Query {
            families: &[Family::Name(family), Family::SansSerif],
            weight: Weight::NORMAL,
            style: Style::Normal,
            stretch: Stretch::Normal,
        };
        let id = db
            .query(&query)
            .ok_or_else(|| TextError::FontLoadError(format!("Font '{family}' not found")))?;
        let (src, index) = db
            .face_source(id)
            .ok_or_else(|| TextError::FontLoadError("Font source not found".to_string()))?;

        let data = match src {
            Source::File(path) => std::fs::read(&path).map_err(|e| {
                TextError::FontLoadError(format!("Failed to read font file {:?}: {}", path, e))
            })?,
            Source::Binary(arc) => arc.as_ref().as_ref().to_vec(),
            Source::SharedFile(_path, data) => data.as_ref().as_ref().to_vec(),
        };
        FontFace::from_data(Arc::new(data), index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;
    use vellum_core::{OutlineGlyph, Rect, Size};

    #[test]
    fn test_missing_font_cached_as_none() {
        let mut doc = Document::new(Size::new(10.0, 10.0));
        let font = doc.add_font(FontSource::File {
            path: "/nonexistent/font.ttf".to_string(),
            index: 0,
        });
        let mut cache = FontCache::new();
        assert!(cache.face(&doc, font).is_none());
        assert!(cache.face(&doc, font).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_outline_memoized() {
        let mut doc = Document::new(Size::new(10.0, 10.0));
        let mut glyphs = FxHashMap::default();
        glyphs.insert(
            5,
            OutlineGlyph {
                path: PathVector::rect(Rect::new(0.0, 0.0, 10.0, 10.0)),
                advance: 12.0,
            },
        );
        let font = doc.add_font(FontSource::Outlines {
            units_per_em: 20.0,
            ascent: 16.0,
            descent: -4.0,
            glyphs,
        });
        let mut cache = FontCache::new();
        let a = cache.outline(&doc, font, 5).unwrap();
        let b = cache.outline(&doc, font, 5).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.outline(&doc, font, 6).is_none());
    }
}
