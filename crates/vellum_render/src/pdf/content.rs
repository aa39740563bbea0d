//! Content stream operators

use std::fmt::Write as _;

use vellum_core::{Affine, Color, FillRule, LineCap, LineJoin, PathVector, Segment};

use super::writer::{array, matrix, num};
use crate::canvas::StrokeStyle;

#[derive(Clone, Debug, Default)]
pub struct Content {
    buf: String,
}

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn op(&mut self, s: &str) {
        self.buf.push_str(s);
        self.buf.push('\n');
    }

    pub fn save(&mut self) {
        self.op("q");
    }

    pub fn restore(&mut self) {
        self.op("Q");
    }

    pub fn transform(&mut self, m: &Affine) {
        let line = format!("{} cm", matrix(m));
        self.op(&line);
    }

    /// Path construction; points are mapped through `m` first
    pub fn path(&mut self, path: &PathVector, m: &Affine) {
        for sp in path.subpaths() {
            let p = m.transform_point(sp.start);
            let _ = writeln!(self.buf, "{} {} m", num(p.x), num(p.y));
            for seg in &sp.segments {
                match *seg {
                    Segment::Line(p) => {
                        let p = m.transform_point(p);
                        let _ = writeln!(self.buf, "{} {} l", num(p.x), num(p.y));
                    }
                    Segment::Cubic(c1, c2, p) => {
                        let (c1, c2, p) = (m.transform_point(c1), m.transform_point(c2), m.transform_point(p));
                        let _ = writeln!(
                            self.buf,
                            "{} {} {} {} {} {} c",
                            num(c1.x),
                            num(c1.y),
                            num(c2.x),
                            num(c2.y),
                            num(p.x),
                            num(p.y)
                        );
                    }
                }
            }
            if sp.closed {
                self.op("h");
            }
        }
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        let line = format!("{} {} {} {} re", num(x), num(y), num(w), num(h));
        self.op(&line);
    }

    pub fn fill(&mut self, rule: FillRule) {
        self.op(match rule {
            FillRule::NonZero => "f",
            FillRule::EvenOdd => "f*",
        });
    }

    pub fn stroke(&mut self) {
        self.op("S");
    }

    /// Intersect the clip with the current path and discard it
    pub fn clip(&mut self, rule: FillRule) {
        self.op(match rule {
            FillRule::NonZero => "W n",
            FillRule::EvenOdd => "W* n",
        });
    }

    pub fn fill_rgb(&mut self, c: Color) {
        let line = format!("{} {} {} rg", num(c.r as f64), num(c.g as f64), num(c.b as f64));
        self.op(&line);
    }

    pub fn stroke_rgb(&mut self, c: Color) {
        let line = format!("{} {} {} RG", num(c.r as f64), num(c.g as f64), num(c.b as f64));
        self.op(&line);
    }

    pub fn fill_pattern(&mut self, name: &str) {
        let line = format!("/Pattern cs /{name} scn");
        self.op(&line);
    }

    pub fn stroke_pattern(&mut self, name: &str) {
        let line = format!("/Pattern CS /{name} SCN");
        self.op(&line);
    }

    pub fn graphics_state(&mut self, name: &str) {
        let line = format!("/{name} gs");
        self.op(&line);
    }

    pub fn x_object(&mut self, name: &str) {
        let line = format!("/{name} Do");
        self.op(&line);
    }

    pub fn shading(&mut self, name: &str) {
        let line = format!("/{name} sh");
        self.op(&line);
    }

    pub fn stroke_style(&mut self, s: &StrokeStyle) {
        let cap = match s.cap {
            LineCap::Butt => 0,
            LineCap::Round => 1,
            LineCap::Square => 2,
        };
        let join = match s.join {
            LineJoin::Miter => 0,
            LineJoin::Round => 1,
            LineJoin::Bevel => 2,
        };
        let _ = writeln!(
            self.buf,
            "{} w {cap} J {join} j {} M",
            num(s.width),
            num(s.miter_limit.max(1.0))
        );
        if !s.dash.is_empty() {
            let mut dash: Vec<f64> = s.dash.iter().map(|d| d.max(0.0)).collect();
            if dash.len() % 2 == 1 {
                dash.extend_from_within(..);
            }
            let _ = writeln!(self.buf, "{} {} d", array(&dash), num(s.dash_offset));
        }
    }

    /// One glyph at text matrix `tm`
    pub fn glyph(&mut self, font: &str, code: u8, tm: &Affine) {
        let _ = writeln!(self.buf, "BT /{font} 1 Tf {} Tm <{code:02X}> Tj ET", matrix(tm));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::{Point, Rect};

    #[test]
    fn test_path_mapped_through_matrix() {
        let mut c = Content::new();
        let flip = Affine::new(1.0, 0.0, 0.0, -1.0, 0.0, 100.0);
        c.path(&PathVector::line(Point::new(0.0, 0.0), Point::new(10.0, 20.0)), &flip);
        assert_eq!(std::str::from_utf8(c.as_bytes()).unwrap(), "0 100 m\n10 80 l\n");
    }

    #[test]
    fn test_closed_rect_and_fill() {
        let mut c = Content::new();
        c.path(&PathVector::rect(Rect::new(0.0, 0.0, 1.0, 1.0)), &Affine::IDENTITY);
        c.fill(FillRule::EvenOdd);
        let text = String::from_utf8(c.as_bytes().to_vec()).unwrap();
        assert!(text.ends_with("h\nf*\n"));
    }

    #[test]
    fn test_glyph_op() {
        let mut c = Content::new();
        c.glyph("F1", 0x2a, &Affine::IDENTITY);
        assert_eq!(
            std::str::from_utf8(c.as_bytes()).unwrap(),
            "BT /F1 1 Tf 1 0 0 1 0 0 Tm <2A> Tj ET\n"
        );
    }
}
