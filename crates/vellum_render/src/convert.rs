//! Conversions to tiny-skia types
//!
//! Geometry stays `f64` everywhere else and is narrowed here.

use tiny_skia::{
    FilterQuality, GradientStop, LineCap as SkCap, LineJoin as SkJoin, Pattern, Shader,
    SpreadMode, Stroke, StrokeDash, Transform,
};
use vellum_core::{
    Affine, Color, FillRule, ImageRendering, LineCap, LineJoin, PathVector, Segment, SpreadMethod,
};

use crate::canvas::{NativePaint, PaintStop, StrokeStyle};

pub fn transform(t: &Affine) -> Transform {
    let [a, b, c, d, e, f] = t.elements;
    Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
}

/// `None` for empty or degenerate paths
pub fn path(p: &PathVector) -> Option<tiny_skia::Path> {
    let mut pb = tiny_skia::PathBuilder::new();
    for sp in p.subpaths() {
        pb.move_to(sp.start.x as f32, sp.start.y as f32);
        for seg in &sp.segments {
            match *seg {
                Segment::Line(p) => pb.line_to(p.x as f32, p.y as f32),
                Segment::Cubic(c1, c2, p) => pb.cubic_to(
                    c1.x as f32,
                    c1.y as f32,
                    c2.x as f32,
                    c2.y as f32,
                    p.x as f32,
                    p.y as f32,
                ),
            }
        }
        if sp.closed {
            pb.close();
        }
    }
    pb.finish()
}

pub fn fill_rule(rule: FillRule) -> tiny_skia::FillRule {
    match rule {
        FillRule::NonZero => tiny_skia::FillRule::Winding,
        FillRule::EvenOdd => tiny_skia::FillRule::EvenOdd,
    }
}

pub fn color(c: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        c.r.clamp(0.0, 1.0),
        c.g.clamp(0.0, 1.0),
        c.b.clamp(0.0, 1.0),
        c.a.clamp(0.0, 1.0),
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

pub fn spread(spread: SpreadMethod) -> SpreadMode {
    match spread {
        SpreadMethod::Pad | SpreadMethod::None => SpreadMode::Pad,
        SpreadMethod::Reflect => SpreadMode::Reflect,
        SpreadMethod::Repeat => SpreadMode::Repeat,
    }
}

pub fn filter_quality(rendering: ImageRendering) -> FilterQuality {
    match rendering {
        ImageRendering::OptimizeQuality => FilterQuality::Bicubic,
        ImageRendering::Auto => FilterQuality::Bilinear,
        ImageRendering::OptimizeSpeed => FilterQuality::Nearest,
    }
}

fn stops(stops: &[PaintStop]) -> Vec<GradientStop> {
    stops
        .iter()
        .map(|s| GradientStop::new(s.offset.clamp(0.0, 1.0), color(s.color)))
        .collect()
}

/// Shader for `paint`; the shader lives in user space
pub fn shader(paint: &NativePaint) -> Option<Shader<'_>> {
    match paint {
        NativePaint::Solid(c) => Some(Shader::SolidColor(color(*c))),
        NativePaint::Linear(g) => tiny_skia::LinearGradient::new(
            tiny_skia::Point::from_xy(g.start.x as f32, g.start.y as f32),
            tiny_skia::Point::from_xy(g.end.x as f32, g.end.y as f32),
            stops(&g.stops),
            spread(g.spread),
            transform(&g.paint_to_user),
        ),
        NativePaint::Radial(g) => tiny_skia::RadialGradient::new(
            tiny_skia::Point::from_xy(g.focal.x as f32, g.focal.y as f32),
            tiny_skia::Point::from_xy(g.center.x as f32, g.center.y as f32),
            g.radius as f32,
            stops(&g.stops),
            spread(g.spread),
            transform(&g.paint_to_user),
        ),
        NativePaint::Tile(t) => Some(Pattern::new(
            tiny_skia::Pixmap::as_ref(&t.pixmap),
            SpreadMode::Repeat,
            FilterQuality::Bilinear,
            t.opacity.clamp(0.0, 1.0),
            transform(&t.paint_to_user),
        )),
    }
}

pub fn stroke(s: &StrokeStyle) -> Stroke {
    let dash = if s.dash.is_empty() {
        None
    } else {
        // odd-length arrays repeat to an even count
        let mut values: Vec<f32> = s.dash.iter().map(|d| d.max(0.0) as f32).collect();
        if values.len() % 2 == 1 {
            values.extend_from_within(..);
        }
        StrokeDash::new(values, s.dash_offset as f32)
    };
    Stroke {
        width: s.width as f32,
        miter_limit: s.miter_limit.max(1.0) as f32,
        line_cap: match s.cap {
            LineCap::Butt => SkCap::Butt,
            LineCap::Round => SkCap::Round,
            LineCap::Square => SkCap::Square,
        },
        line_join: match s.join {
            LineJoin::Miter => SkJoin::Miter,
            LineJoin::Round => SkJoin::Round,
            LineJoin::Bevel => SkJoin::Bevel,
        },
        dash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use vellum_core::Rect;

    #[test]
    fn test_path_roundtrip_bounds() {
        let p = path(&PathVector::rect(Rect::new(1.0, 2.0, 3.0, 4.0))).unwrap();
        let b = p.bounds();
        assert_eq!((b.left(), b.top(), b.right(), b.bottom()), (1.0, 2.0, 4.0, 6.0));
        assert!(path(&PathVector::new()).is_none());
    }

    #[test]
    fn test_odd_dash_doubles() {
        let s = stroke(&StrokeStyle {
            dash: smallvec![2.0, 1.0, 3.0],
            ..StrokeStyle::default()
        });
        assert!(s.dash.is_some());
        let s = stroke(&StrokeStyle::default());
        assert!(s.dash.is_none());
    }

    #[test]
    fn test_miter_limit_clamped() {
        let s = stroke(&StrokeStyle {
            miter_limit: 0.5,
            ..StrokeStyle::default()
        });
        assert_eq!(s.miter_limit, 1.0);
    }
}
