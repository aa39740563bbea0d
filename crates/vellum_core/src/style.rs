//! Presentation style of an item

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::color::Color;
use crate::document::PaintServerId;

/// Strokes thinner than this are treated as absent
pub const MIN_STROKE_WIDTH: f64 = 1e-9;

/// Fill or stroke paint
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Paint {
    /// Explicitly no paint
    None,
    /// Not specified: black for fills, nothing for strokes
    #[default]
    Unset,
    Color(Color),
    /// Paint server reference with an optional fallback color
    Server {
        id: PaintServerId,
        fallback: Option<Color>,
    },
}

impl Paint {
    pub fn is_none(&self) -> bool {
        matches!(self, Paint::None)
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Paint::Server { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// `image-rendering` hint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageRendering {
    #[default]
    Auto,
    OptimizeQuality,
    OptimizeSpeed,
}

/// Coordinate system of paint-server, clip and mask geometry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Units {
    #[default]
    UserSpaceOnUse,
    ObjectBoundingBox,
}

/// Gradient spread method
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadMethod {
    #[default]
    Pad,
    Reflect,
    Repeat,
    None,
}

/// Style properties the renderer consumes
#[derive(Clone, Debug, PartialEq)]
pub struct Style {
    pub fill: Paint,
    pub stroke: Paint,
    pub opacity: f32,
    pub fill_opacity: f32,
    pub stroke_opacity: f32,
    pub fill_rule: FillRule,
    pub clip_rule: FillRule,
    pub stroke_width: f64,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f64,
    pub dash_array: SmallVec<[f64; 4]>,
    pub dash_offset: f64,
    pub image_rendering: ImageRendering,
    pub overflow_visible: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: Paint::Unset,
            stroke: Paint::None,
            opacity: 1.0,
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            fill_rule: FillRule::NonZero,
            clip_rule: FillRule::NonZero,
            stroke_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 4.0,
            dash_array: SmallVec::new(),
            dash_offset: 0.0,
            image_rendering: ImageRendering::Auto,
            overflow_visible: false,
        }
    }
}

impl Style {
    /// Solid fill, no stroke
    pub fn filled(color: Color) -> Self {
        Self {
            fill: Paint::Color(color),
            ..Self::default()
        }
    }

    /// Nothing visible gets painted by the fill
    pub fn no_fill(&self) -> bool {
        self.fill.is_none() || self.fill_opacity <= 0.0
    }

    /// Nothing visible gets painted by the stroke
    pub fn no_stroke(&self) -> bool {
        matches!(self.stroke, Paint::None | Paint::Unset)
            || self.stroke_width < MIN_STROKE_WIDTH
            || self.stroke_opacity <= 0.0
    }

    /// Half the stroke width when a stroke is painted
    pub fn stroke_extent(&self) -> f64 {
        if self.no_stroke() {
            0.0
        } else {
            self.stroke_width / 2.0
        }
    }
}
