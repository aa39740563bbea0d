//! `preserveAspectRatio` handling for view boxes and images

use serde::{Deserialize, Serialize};

use crate::geometry::{Affine, Rect};

/// Alignment of the view box inside the viewport
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Align {
    /// Stretch non-uniformly
    None,
    XMinYMin,
    XMidYMin,
    XMaxYMin,
    XMinYMid,
    #[default]
    XMidYMid,
    XMaxYMid,
    XMinYMax,
    XMidYMax,
    XMaxYMax,
}

impl Align {
    /// Alignment factors (0 = min, 0.5 = mid, 1 = max)
    fn factors(self) -> (f64, f64) {
        match self {
            Align::None | Align::XMidYMid => (0.5, 0.5),
            Align::XMinYMin => (0.0, 0.0),
            Align::XMidYMin => (0.5, 0.0),
            Align::XMaxYMin => (1.0, 0.0),
            Align::XMinYMid => (0.0, 0.5),
            Align::XMaxYMid => (1.0, 0.5),
            Align::XMinYMax => (0.0, 1.0),
            Align::XMidYMax => (0.5, 1.0),
            Align::XMaxYMax => (1.0, 1.0),
        }
    }
}

/// Parsed `preserveAspectRatio` value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectRatio {
    pub align: Align,
    /// `slice` (cover) instead of `meet` (contain)
    pub slice: bool,
}

impl AspectRatio {
    pub const NONE: AspectRatio = AspectRatio {
        align: Align::None,
        slice: false,
    };

    /// Parse e.g. `"xMidYMid meet"`; unknown values give the default
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split_whitespace();
        let align = match parts.next().unwrap_or("xMidYMid") {
            "none" => Align::None,
            "xMinYMin" => Align::XMinYMin,
            "xMidYMin" => Align::XMidYMin,
            "xMaxYMin" => Align::XMaxYMin,
            "xMinYMid" => Align::XMinYMid,
            "xMaxYMid" => Align::XMaxYMid,
            "xMinYMax" => Align::XMinYMax,
            "xMidYMax" => Align::XMidYMax,
            "xMaxYMax" => Align::XMaxYMax,
            _ => Align::XMidYMid,
        };
        let slice = parts.next() == Some("slice");
        Self { align, slice }
    }

    /// Transform mapping `view_box` into `viewport`
    pub fn view_box_transform(&self, view_box: &Rect, viewport: &Rect) -> Affine {
        if view_box.width() <= 0.0 || view_box.height() <= 0.0 {
            return Affine::translation(viewport.x(), viewport.y());
        }
        let sx = viewport.width() / view_box.width();
        let sy = viewport.height() / view_box.height();

        let (sx, sy) = if self.align == Align::None {
            (sx, sy)
        } else {
            let s = if self.slice { sx.max(sy) } else { sx.min(sy) };
            (s, s)
        };

        let (fx, fy) = self.align.factors();
        let tx = viewport.x() + (viewport.width() - view_box.width() * sx) * fx - view_box.x() * sx;
        let ty = viewport.y() + (viewport.height() - view_box.height() * sy) * fy - view_box.y() * sy;
        Affine::new(sx, 0.0, 0.0, sy, tx, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn test_meet_centers_letterbox() {
        let t = AspectRatio::default()
            .view_box_transform(&Rect::new(0.0, 0.0, 10.0, 5.0), &Rect::new(0.0, 0.0, 20.0, 20.0));
        // scale 2, 10 units of vertical slack split evenly
        assert_eq!(t.transform_point(Point::new(0.0, 0.0)), Point::new(0.0, 5.0));
        assert_eq!(t.transform_point(Point::new(10.0, 5.0)), Point::new(20.0, 15.0));
    }

    #[test]
    fn test_slice_covers() {
        let t = AspectRatio::parse("xMinYMin slice")
            .view_box_transform(&Rect::new(0.0, 0.0, 10.0, 5.0), &Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(t.a(), 4.0);
        assert_eq!(t.e(), 0.0);
    }

    #[test]
    fn test_none_stretches() {
        let t = AspectRatio::NONE
            .view_box_transform(&Rect::new(0.0, 0.0, 10.0, 5.0), &Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!((t.a(), t.d()), (2.0, 4.0));
    }
}
