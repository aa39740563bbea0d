//! Axial and radial shadings for gradient paints
//!
//! PDF shadings only extend by padding. Repeat and reflect are written as
//! one stitched function spanning every period the painted area touches;
//! that works for linear and concentric radial gradients. Other radial
//! gradients fall back to padding.

use std::fmt::Write as _;

use vellum_core::{Color, Point, Rect, SpreadMethod};

use super::writer::array;
use crate::canvas::{LinearPaint, PaintStop, RadialPaint};

/// Most periods stitched into one function
const MAX_PERIODS: i64 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    /// DeviceRGB color
    Rgb,
    /// DeviceGray stop alpha, for soft masks
    Alpha,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShadingSpec {
    /// 2 axial, 3 radial
    pub shading_type: u8,
    pub coords: Vec<f64>,
    pub stops: Vec<PaintStop>,
}

impl ShadingSpec {
    pub fn dict(&self, channels: Channels) -> String {
        let space = match channels {
            Channels::Rgb => "/DeviceRGB",
            Channels::Alpha => "/DeviceGray",
        };
        format!(
            "<< /ShadingType {} /ColorSpace {space} /Coords {} /Function {} /Extend [true true] >>",
            self.shading_type,
            array(&self.coords),
            function(&self.stops, channels)
        )
    }
}

/// Shared stop alpha, if every stop has the same one
pub fn uniform_alpha(stops: &[PaintStop]) -> Option<f32> {
    let first = stops.first()?.color.a;
    stops
        .iter()
        .all(|s| (s.color.a - first).abs() < 1.0 / 512.0)
        .then_some(first)
}

fn components(c: &Color, channels: Channels) -> Vec<f64> {
    match channels {
        Channels::Rgb => vec![c.r as f64, c.g as f64, c.b as f64],
        Channels::Alpha => vec![c.a as f64],
    }
}

/// Piecewise-linear function through `stops` on [0, 1]
pub fn function(stops: &[PaintStop], channels: Channels) -> String {
    let stops = padded(stops);
    let piece = |a: &PaintStop, b: &PaintStop| {
        format!(
            "<< /FunctionType 2 /Domain [0 1] /C0 {} /C1 {} /N 1 >>",
            array(&components(&a.color, channels)),
            array(&components(&b.color, channels))
        )
    };
    match stops.len() {
        0 => piece(&black_stop(), &black_stop()),
        1 => piece(&stops[0], &stops[0]),
        2 => piece(&stops[0], &stops[1]),
        n => {
            let mut functions = String::new();
            let mut encode = Vec::with_capacity((n - 1) * 2);
            for pair in stops.windows(2) {
                functions.push_str(&piece(&pair[0], &pair[1]));
                functions.push(' ');
                encode.extend_from_slice(&[0.0, 1.0]);
            }
            let bounds: Vec<f64> = stops[1..n - 1].iter().map(|s| s.offset as f64).collect();
            let mut out = String::new();
            let _ = write!(
                out,
                "<< /FunctionType 3 /Domain [0 1] /Functions [{}] /Bounds {} /Encode {} >>",
                functions.trim_end(),
                array(&bounds),
                array(&encode)
            );
            out
        }
    }
}

fn black_stop() -> PaintStop {
    PaintStop {
        offset: 0.0,
        color: Color::BLACK,
    }
}

/// Stops extended to cover exactly [0, 1]
fn padded(stops: &[PaintStop]) -> Vec<PaintStop> {
    let mut out = Vec::with_capacity(stops.len() + 2);
    if let Some(first) = stops.first() {
        if first.offset > 0.0 {
            out.push(PaintStop { offset: 0.0, ..*first });
        }
    }
    out.extend_from_slice(stops);
    if let Some(last) = stops.last() {
        if last.offset < 1.0 {
            out.push(PaintStop { offset: 1.0, ..*last });
        }
    }
    out
}

/// Stops repeated over periods `k0..k1`, rescaled onto [0, 1]
fn stitched(stops: &[PaintStop], k0: i64, k1: i64, spread: SpreadMethod) -> Vec<PaintStop> {
    let base = padded(stops);
    let span = (k1 - k0) as f32;
    let mut out = Vec::with_capacity(base.len() * (k1 - k0) as usize);
    for k in k0..k1 {
        let reversed = spread == SpreadMethod::Reflect && k.rem_euclid(2) == 1;
        let origin = (k - k0) as f32;
        let period: Vec<PaintStop> = if reversed {
            base.iter()
                .rev()
                .map(|s| PaintStop {
                    offset: 1.0 - s.offset,
                    color: s.color,
                })
                .collect()
        } else {
            base.clone()
        };
        out.extend(period.into_iter().map(|s| PaintStop {
            offset: (origin + s.offset) / span,
            color: s.color,
        }));
    }
    out
}

fn repeats(spread: SpreadMethod) -> bool {
    matches!(spread, SpreadMethod::Repeat | SpreadMethod::Reflect)
}

/// Period range covering `tmin..tmax`, if small enough to stitch
fn periods(tmin: f64, tmax: f64) -> Option<(i64, i64)> {
    if !(tmin.is_finite() && tmax.is_finite()) {
        return None;
    }
    let k0 = tmin.floor() as i64;
    let k1 = (tmax.ceil() as i64).max(k0 + 1);
    (k1 - k0 <= MAX_PERIODS).then_some((k0, k1))
}

/// Axial shading; `extent` is the painted area in gradient space
pub fn linear(g: &LinearPaint, extent: Option<Rect>) -> ShadingSpec {
    let d = Point::new(g.end.x - g.start.x, g.end.y - g.start.y);
    let len2 = d.x * d.x + d.y * d.y;
    let plain = || ShadingSpec {
        shading_type: 2,
        coords: vec![g.start.x, g.start.y, g.end.x, g.end.y],
        stops: g.stops.clone(),
    };
    let Some(extent) = extent.filter(|_| repeats(g.spread) && len2 > 0.0) else {
        return plain();
    };

    let (mut tmin, mut tmax) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in extent.corners() {
        let t = ((p.x - g.start.x) * d.x + (p.y - g.start.y) * d.y) / len2;
        tmin = tmin.min(t);
        tmax = tmax.max(t);
    }
    let Some((k0, k1)) = periods(tmin, tmax) else {
        tracing::debug!("gradient spans too many periods, padding instead");
        return plain();
    };
    ShadingSpec {
        shading_type: 2,
        coords: vec![
            g.start.x + d.x * k0 as f64,
            g.start.y + d.y * k0 as f64,
            g.start.x + d.x * k1 as f64,
            g.start.y + d.y * k1 as f64,
        ],
        stops: stitched(&g.stops, k0, k1, g.spread),
    }
}

/// Radial shading; `extent` is the painted area in gradient space
pub fn radial(g: &RadialPaint, extent: Option<Rect>) -> ShadingSpec {
    let plain = || ShadingSpec {
        shading_type: 3,
        coords: vec![g.focal.x, g.focal.y, 0.0, g.center.x, g.center.y, g.radius],
        stops: g.stops.clone(),
    };
    let Some(extent) = extent.filter(|_| repeats(g.spread) && g.radius > 0.0) else {
        return plain();
    };
    if g.focal.distance(g.center) > 1e-9 {
        tracing::debug!("repeating radial gradient with a focal point padded");
        return plain();
    }
    let tmax = extent
        .corners()
        .iter()
        .map(|p| p.distance(g.center) / g.radius)
        .fold(0.0, f64::max);
    let Some((_, k1)) = periods(0.0, tmax) else {
        tracing::debug!("gradient spans too many periods, padding instead");
        return plain();
    };
    ShadingSpec {
        shading_type: 3,
        coords: vec![g.center.x, g.center.y, 0.0, g.center.x, g.center.y, g.radius * k1 as f64],
        stops: stitched(&g.stops, 0, k1, g.spread),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::Affine;

    fn stop(offset: f32, color: Color) -> PaintStop {
        PaintStop { offset, color }
    }

    fn gradient(spread: SpreadMethod) -> LinearPaint {
        LinearPaint {
            start: Point::new(0.0, 0.0),
            end: Point::new(10.0, 0.0),
            stops: vec![stop(0.0, Color::RED), stop(1.0, Color::BLUE)],
            spread,
            paint_to_user: Affine::IDENTITY,
        }
    }

    #[test]
    fn test_two_stops_single_function() {
        let f = function(&[stop(0.0, Color::RED), stop(1.0, Color::BLUE)], Channels::Rgb);
        assert!(f.starts_with("<< /FunctionType 2"));
        assert!(f.contains("/C0 [1 0 0]"));
    }

    #[test]
    fn test_three_stops_stitched() {
        let f = function(
            &[stop(0.0, Color::RED), stop(0.25, Color::GREEN), stop(1.0, Color::BLUE)],
            Channels::Rgb,
        );
        assert!(f.contains("/FunctionType 3"));
        assert!(f.contains("/Bounds [0.25]"));
        assert!(f.contains("/Encode [0 1 0 1]"));
    }

    #[test]
    fn test_pad_keeps_coords() {
        let sh = linear(&gradient(SpreadMethod::Pad), Some(Rect::new(-20.0, 0.0, 60.0, 5.0)));
        assert_eq!(sh.coords, vec![0.0, 0.0, 10.0, 0.0]);
    }

    #[test]
    fn test_repeat_covers_extent() {
        let sh = linear(&gradient(SpreadMethod::Repeat), Some(Rect::new(-20.0, 0.0, 60.0, 5.0)));
        assert_eq!(sh.coords, vec![-20.0, 0.0, 40.0, 0.0]);
        // six periods of two stops
        assert_eq!(sh.stops.len(), 12);
        assert_eq!(sh.stops[0].color, Color::RED);
    }

    #[test]
    fn test_reflect_reverses_odd_periods() {
        let sh = linear(&gradient(SpreadMethod::Reflect), Some(Rect::new(0.0, 0.0, 20.0, 1.0)));
        assert_eq!(sh.stops.len(), 4);
        assert_eq!(sh.stops[2].color, Color::BLUE);
        assert_eq!(sh.stops[3].color, Color::RED);
    }

    #[test]
    fn test_uniform_alpha() {
        assert_eq!(uniform_alpha(&[stop(0.0, Color::RED), stop(1.0, Color::BLUE)]), Some(1.0));
        assert_eq!(
            uniform_alpha(&[stop(0.0, Color::RED), stop(1.0, Color::BLUE.with_alpha(0.5))]),
            None
        );
    }
}
