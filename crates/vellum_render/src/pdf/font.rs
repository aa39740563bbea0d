//! Type 3 font subsets built from glyph outlines
//!
//! Each subset holds up to 256 glyphs addressed by one-byte codes. Glyph
//! procedures fill the outline in font units; the font matrix scales them
//! by `1 / unitsPerEm`, so text is shown at size 1 with the glyph size in
//! the text matrix.

use std::fmt::Write as _;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use vellum_core::{FillRule, FontId, PathVector, Rect};

use super::content::Content;
use super::writer::{array, num, ObjId, PdfWriter};
use crate::canvas::PlacedGlyph;

const SUBSET_SIZE: usize = 256;

struct SubsetGlyph {
    outline: Option<Arc<PathVector>>,
    /// Advance in font units
    advance: f64,
}

struct Subset {
    name: String,
    id: ObjId,
    units_per_em: f64,
    glyphs: Vec<SubsetGlyph>,
    codes: FxHashMap<u32, u8>,
}

/// Resource name and byte code of a glyph
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlyphSlot {
    pub font: String,
    pub code: u8,
}

#[derive(Default)]
pub struct Type3Fonts {
    subsets: Vec<Subset>,
    by_font: FxHashMap<FontId, Vec<usize>>,
}

impl Type3Fonts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `glyph`, adding it to a subset of `font` if needed
    pub fn slot(
        &mut self,
        writer: &mut PdfWriter,
        font: FontId,
        units_per_em: f64,
        size: f64,
        glyph: &PlacedGlyph,
    ) -> GlyphSlot {
        let indices = self.by_font.entry(font).or_default();
        for &i in indices.iter() {
            let subset = &self.subsets[i];
            if let Some(code) = subset.codes.get(&glyph.id) {
                return GlyphSlot {
                    font: subset.name.clone(),
                    code: *code,
                };
            }
        }

        let open = indices
            .iter()
            .copied()
            .find(|i| self.subsets[*i].glyphs.len() < SUBSET_SIZE);
        let index = match open {
            Some(i) => i,
            None => {
                let index = self.subsets.len();
                self.subsets.push(Subset {
                    name: format!("T3F{index}"),
                    id: writer.alloc(),
                    units_per_em,
                    glyphs: Vec::new(),
                    codes: FxHashMap::default(),
                });
                indices.push(index);
                index
            }
        };

        let subset = &mut self.subsets[index];
        let code = subset.glyphs.len() as u8;
        let advance = if size > 0.0 {
            glyph.advance * units_per_em / size
        } else {
            0.0
        };
        subset.glyphs.push(SubsetGlyph {
            outline: glyph.outline.clone(),
            advance,
        });
        subset.codes.insert(glyph.id, code);
        GlyphSlot {
            font: subset.name.clone(),
            code,
        }
    }

    /// Write every subset; returns resource names and objects
    pub fn write(&self, writer: &mut PdfWriter) -> Vec<(String, ObjId)> {
        self.subsets
            .iter()
            .map(|subset| {
                write_subset(writer, subset);
                (subset.name.clone(), subset.id)
            })
            .collect()
    }
}

fn write_subset(writer: &mut PdfWriter, subset: &Subset) {
    let mut procs = String::new();
    let mut differences = String::from("0");
    let mut widths = Vec::with_capacity(subset.glyphs.len());
    let mut font_bbox: Option<Rect> = None;

    for (code, glyph) in subset.glyphs.iter().enumerate() {
        let bounds = glyph.outline.as_ref().and_then(|o| o.bounds());
        let mut content = Content::new();
        let header = match bounds {
            Some(b) => format!(
                "{} 0 {} {} {} {} d1\n",
                num(glyph.advance),
                num(b.min_x()),
                num(b.min_y()),
                num(b.max_x()),
                num(b.max_y())
            ),
            None => format!("{} 0 0 0 0 0 d1\n", num(glyph.advance)),
        };
        if let (Some(outline), Some(_)) = (&glyph.outline, bounds) {
            content.path(outline, &vellum_core::Affine::IDENTITY);
            content.fill(FillRule::NonZero);
        }
        let mut data = header.into_bytes();
        data.extend_from_slice(content.as_bytes());
        let proc_id = writer.add_stream("", &data);

        let _ = write!(procs, " /g{code} {}", proc_id.r());
        let _ = write!(differences, " /g{code}");
        widths.push(glyph.advance);
        font_bbox = vellum_core::geometry::union_opt(font_bbox, bounds);
    }

    let bbox = font_bbox.unwrap_or_default();
    let scale = 1.0 / subset.units_per_em.max(1.0);
    let dict = format!(
        "<< /Type /Font /Subtype /Type3 /FontBBox {} /FontMatrix {} /CharProcs <<{procs} >> \
         /Encoding << /Type /Encoding /Differences [{differences}] >> /FirstChar 0 /LastChar {} \
         /Widths {} /Resources << >> >>",
        array(&[bbox.min_x(), bbox.min_y(), bbox.max_x(), bbox.max_y()]),
        array(&[scale, 0.0, 0.0, scale, 0.0, 0.0]),
        subset.glyphs.len().saturating_sub(1),
        array(&widths)
    );
    writer.set(subset.id, dict);
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn glyph(id: u32) -> PlacedGlyph {
        PlacedGlyph {
            id,
            x: 0.0,
            y: 0.0,
            advance: 10.0,
            outline: Some(Arc::new(PathVector::rect(Rect::new(0.0, 0.0, 500.0, 700.0)))),
        }
    }

    fn font() -> FontId {
        FontId::from(KeyData::from_ffi(1))
    }

    #[test]
    fn test_glyphs_share_codes() {
        let mut writer = PdfWriter::new();
        let mut fonts = Type3Fonts::new();
        let a = fonts.slot(&mut writer, font(), 1000.0, 20.0, &glyph(5));
        let b = fonts.slot(&mut writer, font(), 1000.0, 20.0, &glyph(9));
        let c = fonts.slot(&mut writer, font(), 1000.0, 20.0, &glyph(5));
        assert_eq!(a, c);
        assert_eq!(b.code, 1);
        assert_eq!(a.font, b.font);
    }

    #[test]
    fn test_subset_rolls_over_at_256() {
        let mut writer = PdfWriter::new();
        let mut fonts = Type3Fonts::new();
        for id in 0..256 {
            fonts.slot(&mut writer, font(), 1000.0, 20.0, &glyph(id));
        }
        let next = fonts.slot(&mut writer, font(), 1000.0, 20.0, &glyph(256));
        assert_eq!(next, GlyphSlot { font: "T3F1".into(), code: 0 });
    }

    #[test]
    fn test_written_font_has_matrix_and_widths() {
        let mut writer = PdfWriter::new();
        let mut fonts = Type3Fonts::new();
        fonts.slot(&mut writer, font(), 1000.0, 20.0, &glyph(3));
        let names = fonts.write(&mut writer);
        assert_eq!(names.len(), 1);

        let root = names[0].1;
        let mut out = Vec::new();
        writer.write(&mut out, "1.4", root, None).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("/FontMatrix [0.001 0 0 0.001 0 0]"));
        assert!(text.contains("/Widths [500]"));
        assert!(text.contains("500 0 0 0 500 700 d1"));
    }
}
