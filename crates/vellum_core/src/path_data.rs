//! SVG path data (`d` attribute) parsing
//!
//! Supports every SVG 1.1 command in absolute and relative form. Quadratic
//! curves and elliptical arcs are converted to cubics on the way in, so the
//! result only contains line and cubic segments.

use nom::{
    character::complete::{char, multispace0, one_of},
    combinator::{map, opt},
    number::complete::double,
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::{CoreError, Result};
use crate::geometry::Point;
use crate::path::{PathBuilder, PathVector};

/// Optional whitespace with at most one comma
fn sep(input: &str) -> IResult<&str, ()> {
    map(
        tuple((multispace0, opt(char(',')), multispace0)),
        |_| (),
    )(input)
}

fn number(input: &str) -> IResult<&str, f64> {
    preceded(sep, double)(input)
}

fn flag(input: &str) -> IResult<&str, bool> {
    map(preceded(sep, one_of("01")), |c| c == '1')(input)
}

fn pair(input: &str) -> IResult<&str, (f64, f64)> {
    tuple((number, number))(input)
}

fn command(input: &str) -> IResult<&str, char> {
    preceded(multispace0, one_of("MmLlHhVvCcSsQqTtAaZz"))(input)
}

/// Arguments for one command repetition
enum Args {
    Pair(f64, f64),
    Single(f64),
    Cubic([f64; 6]),
    Quad([f64; 4]),
    Arc {
        rx: f64,
        ry: f64,
        rotation: f64,
        large_arc: bool,
        sweep: bool,
        x: f64,
        y: f64,
    },
}

fn args_for(cmd: char, input: &str) -> IResult<&str, Args> {
    match cmd.to_ascii_uppercase() {
        'M' | 'L' | 'T' => map(pair, |(x, y)| Args::Pair(x, y))(input),
        'H' | 'V' => map(number, Args::Single)(input),
        'C' => map(tuple((pair, pair, pair)), |((a, b), (c, d), (e, f))| {
            Args::Cubic([a, b, c, d, e, f])
        })(input),
        'S' | 'Q' => map(tuple((pair, pair)), |((a, b), (c, d))| Args::Quad([a, b, c, d]))(input),
        _ => map(
            tuple((number, number, number, flag, flag, pair)),
            |(rx, ry, rotation, large_arc, sweep, (x, y))| Args::Arc {
                rx,
                ry,
                rotation,
                large_arc,
                sweep,
                x,
                y,
            },
        )(input),
    }
}

/// Running state while interpreting commands
struct Interp {
    builder: PathBuilder,
    current: Point,
    start: Point,
    last_cubic_ctrl: Option<Point>,
    last_quad_ctrl: Option<Point>,
}

impl Interp {
    fn new() -> Self {
        Self {
            builder: PathBuilder::new(),
            current: Point::ZERO,
            start: Point::ZERO,
            last_cubic_ctrl: None,
            last_quad_ctrl: None,
        }
    }

    fn with_builder(&mut self, f: impl FnOnce(PathBuilder) -> PathBuilder) {
        let builder = std::mem::take(&mut self.builder);
        self.builder = f(builder);
    }

    fn abs(&self, relative: bool, x: f64, y: f64) -> Point {
        if relative {
            Point::new(self.current.x + x, self.current.y + y)
        } else {
            Point::new(x, y)
        }
    }

    fn apply(&mut self, cmd: char, args: Args) {
        let rel = cmd.is_ascii_lowercase();
        let upper = cmd.to_ascii_uppercase();
        let mut cubic_ctrl = None;
        let mut quad_ctrl = None;

        match (upper, args) {
            ('M', Args::Pair(x, y)) => {
                let p = self.abs(rel, x, y);
                self.with_builder(|b| b.move_to(p.x, p.y));
                self.start = p;
                self.current = p;
            }
            ('L', Args::Pair(x, y)) => {
                let p = self.abs(rel, x, y);
                self.line(p);
            }
            ('H', Args::Single(v)) => {
                let x = if rel { self.current.x + v } else { v };
                self.line(Point::new(x, self.current.y));
            }
            ('V', Args::Single(v)) => {
                let y = if rel { self.current.y + v } else { v };
                self.line(Point::new(self.current.x, y));
            }
            ('C', Args::Cubic([a, b, c, d, e, f])) => {
                let c1 = self.abs(rel, a, b);
                let c2 = self.abs(rel, c, d);
                let p = self.abs(rel, e, f);
                self.cubic(c1, c2, p);
                cubic_ctrl = Some(c2);
            }
            ('S', Args::Quad([c, d, e, f])) => {
                let c1 = self.reflected(self.last_cubic_ctrl);
                let c2 = self.abs(rel, c, d);
                let p = self.abs(rel, e, f);
                self.cubic(c1, c2, p);
                cubic_ctrl = Some(c2);
            }
            ('Q', Args::Quad([a, b, c, d])) => {
                let q = self.abs(rel, a, b);
                let p = self.abs(rel, c, d);
                self.with_builder(|bld| bld.quad_to(q.x, q.y, p.x, p.y));
                self.current = p;
                quad_ctrl = Some(q);
            }
            ('T', Args::Pair(x, y)) => {
                let q = self.reflected(self.last_quad_ctrl);
                let p = self.abs(rel, x, y);
                self.with_builder(|bld| bld.quad_to(q.x, q.y, p.x, p.y));
                self.current = p;
                quad_ctrl = Some(q);
            }
            (
                'A',
                Args::Arc {
                    rx,
                    ry,
                    rotation,
                    large_arc,
                    sweep,
                    x,
                    y,
                },
            ) => {
                let p = self.abs(rel, x, y);
                self.arc(rx, ry, rotation, large_arc, sweep, p);
            }
            _ => {}
        }

        self.last_cubic_ctrl = cubic_ctrl;
        self.last_quad_ctrl = quad_ctrl;
    }

    fn close(&mut self) {
        self.with_builder(PathBuilder::close);
        self.current = self.start;
        self.last_cubic_ctrl = None;
        self.last_quad_ctrl = None;
    }

    fn reflected(&self, ctrl: Option<Point>) -> Point {
        match ctrl {
            Some(c) => Point::new(2.0 * self.current.x - c.x, 2.0 * self.current.y - c.y),
            None => self.current,
        }
    }

    fn line(&mut self, p: Point) {
        self.with_builder(|b| b.line_to(p.x, p.y));
        self.current = p;
    }

    fn cubic(&mut self, c1: Point, c2: Point, p: Point) {
        self.with_builder(|b| b.cubic_to(c1.x, c1.y, c2.x, c2.y, p.x, p.y));
        self.current = p;
    }

    /// Endpoint-parameterized arc, split into cubics of at most 90 degrees
    fn arc(&mut self, rx: f64, ry: f64, rotation: f64, large_arc: bool, sweep: bool, p: Point) {
        let p0 = self.current;
        let mut rx = rx.abs();
        let mut ry = ry.abs();
        if p0 == p {
            return;
        }
        if rx < 1e-12 || ry < 1e-12 {
            self.line(p);
            return;
        }

        let (sin_phi, cos_phi) = rotation.to_radians().sin_cos();
        let dx = (p0.x - p.x) / 2.0;
        let dy = (p0.y - p.y) / 2.0;
        let x1 = cos_phi * dx + sin_phi * dy;
        let y1 = -sin_phi * dx + cos_phi * dy;

        // scale radii up when the endpoints don't fit
        let lambda = (x1 * x1) / (rx * rx) + (y1 * y1) / (ry * ry);
        if lambda > 1.0 {
            let s = lambda.sqrt();
            rx *= s;
            ry *= s;
        }

        let num = rx * rx * ry * ry - rx * rx * y1 * y1 - ry * ry * x1 * x1;
        let den = rx * rx * y1 * y1 + ry * ry * x1 * x1;
        let mut coef = (num / den).max(0.0).sqrt();
        if large_arc == sweep {
            coef = -coef;
        }
        let cx1 = coef * rx * y1 / ry;
        let cy1 = -coef * ry * x1 / rx;
        let cx = cos_phi * cx1 - sin_phi * cy1 + (p0.x + p.x) / 2.0;
        let cy = sin_phi * cx1 + cos_phi * cy1 + (p0.y + p.y) / 2.0;

        let angle = |ux: f64, uy: f64, vx: f64, vy: f64| (ux * vy - uy * vx).atan2(ux * vx + uy * vy);
        let theta1 = angle(1.0, 0.0, (x1 - cx1) / rx, (y1 - cy1) / ry);
        let mut delta = angle(
            (x1 - cx1) / rx,
            (y1 - cy1) / ry,
            (-x1 - cx1) / rx,
            (-y1 - cy1) / ry,
        );
        if !sweep && delta > 0.0 {
            delta -= std::f64::consts::TAU;
        } else if sweep && delta < 0.0 {
            delta += std::f64::consts::TAU;
        }

        let n = (delta.abs() / std::f64::consts::FRAC_PI_2).ceil().max(1.0) as usize;
        let step = delta / n as f64;
        let k = 4.0 / 3.0 * (step / 4.0).tan();
        let point_at = |t: f64| {
            let (s, c) = t.sin_cos();
            Point::new(
                cx + rx * c * cos_phi - ry * s * sin_phi,
                cy + rx * c * sin_phi + ry * s * cos_phi,
            )
        };
        let deriv_at = |t: f64| {
            let (s, c) = t.sin_cos();
            Point::new(
                -rx * s * cos_phi - ry * c * sin_phi,
                -rx * s * sin_phi + ry * c * cos_phi,
            )
        };

        let mut t = theta1;
        for i in 0..n {
            let t2 = t + step;
            let a = point_at(t);
            let da = deriv_at(t);
            let b = if i + 1 == n { p } else { point_at(t2) };
            let db = deriv_at(t2);
            let c1 = Point::new(a.x + k * da.x, a.y + k * da.y);
            let c2 = Point::new(b.x - k * db.x, b.y - k * db.y);
            self.cubic(c1, c2, b);
            t = t2;
        }
    }
}

/// Parse SVG path data into a path vector
pub fn parse_path_data(data: &str) -> Result<PathVector> {
    let mut interp = Interp::new();
    let mut input = data;

    loop {
        let (rest, _) = multispace0::<_, nom::error::Error<&str>>(input)
            .map_err(|_| error_at(data, input, "unexpected input"))?;
        if rest.is_empty() {
            break;
        }
        let (rest, cmd) =
            command(rest).map_err(|_| error_at(data, rest, "expected a path command"))?;

        if cmd == 'Z' || cmd == 'z' {
            interp.close();
            input = rest;
            continue;
        }

        let (mut rest, args) =
            args_for(cmd, rest).map_err(|_| error_at(data, rest, "bad command arguments"))?;
        interp.apply(cmd, args);

        // repeated argument groups; extra moveto pairs are implicit linetos
        let repeat = match cmd {
            'M' => 'L',
            'm' => 'l',
            other => other,
        };
        while let Ok((next, args)) = args_for(repeat, rest) {
            interp.apply(repeat, args);
            rest = next;
        }
        input = rest;
    }

    Ok(interp.builder.build())
}

/// Format a path vector as absolute SVG path data
pub fn format_path_data(path: &PathVector) -> String {
    use std::fmt::Write;

    use crate::path::Segment;

    let mut out = String::new();
    for sp in path.subpaths() {
        let _ = write!(out, "M{} {}", sp.start.x, sp.start.y);
        for seg in &sp.segments {
            let _ = match *seg {
                Segment::Line(p) => write!(out, " L{} {}", p.x, p.y),
                Segment::Cubic(c1, c2, p) => write!(
                    out,
                    " C{} {} {} {} {} {}",
                    c1.x, c1.y, c2.x, c2.y, p.x, p.y
                ),
            };
        }
        if sp.closed {
            out.push_str(" Z");
        }
        out.push(' ');
    }
    out.trim_end().to_string()
}

fn error_at(full: &str, rest: &str, message: &str) -> CoreError {
    CoreError::PathData {
        offset: full.len().saturating_sub(rest.len()),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn test_absolute_rect() {
        let p = parse_path_data("M0,0 L10,0 L10,10 L0,10 Z").unwrap();
        assert_eq!(p.bounds(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(p.subpaths()[0].closed);
    }

    #[test]
    fn test_relative_and_implicit_lineto() {
        let p = parse_path_data("m 5 5 10 0 0 10 h -10 z").unwrap();
        assert_eq!(p.bounds(), Some(Rect::new(5.0, 5.0, 10.0, 10.0)));
        assert_eq!(p.subpaths()[0].segments.len(), 3);
    }

    #[test]
    fn test_compact_numbers() {
        let p = parse_path_data("M1-2L.5.5").unwrap();
        let sp = &p.subpaths()[0];
        assert_eq!(sp.start, Point::new(1.0, -2.0));
        assert_eq!(sp.end(), Point::new(0.5, 0.5));
    }

    #[test]
    fn test_arc_semicircle() {
        let p = parse_path_data("M0 0 A5 5 0 0 1 10 0").unwrap();
        let b = p.bounds().unwrap();
        assert!((b.width() - 10.0).abs() < 1e-6);
        assert!((b.height() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_arc_compact_flags() {
        assert!(parse_path_data("M0 0a5 5 0 0110 0").is_ok());
    }

    #[test]
    fn test_format_reparses() {
        let p = parse_path_data("M0 0 C 1 2 3 4 5 6 Z m 1 1 l 2 0").unwrap();
        let again = parse_path_data(&format_path_data(&p)).unwrap();
        assert_eq!(p, again);
    }

    #[test]
    fn test_bad_command() {
        let err = parse_path_data("M0 0 X 3").unwrap_err();
        assert!(matches!(err, CoreError::PathData { offset: 5, .. }));
    }
}
