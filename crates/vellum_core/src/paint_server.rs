//! Paint servers: solid colors, gradients, patterns and hatches
//!
//! Gradients and patterns may inherit unset attributes from another server
//! through `href`. The `resolve_*` functions on [`Document`] walk that chain
//! (rejecting cycles) and return fully specified values.

use smallvec::SmallVec;

use crate::aspect::AspectRatio;
use crate::color::Color;
use crate::document::{Document, ItemId, PaintServerId};
use crate::error::{CoreError, Result};
use crate::geometry::{Affine, Point, Rect};
use crate::path::PathVector;
use crate::style::{SpreadMethod, Style, Units};

/// Longest href chain followed before giving up
const MAX_HREF_CHAIN: usize = 32;

/// A gradient stop; `color` is opaque RGB, alpha lives in `opacity`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
    pub opacity: f32,
}

impl GradientStop {
    pub fn new(offset: f32, color: Color) -> Self {
        Self {
            offset,
            color: color.with_alpha(1.0),
            opacity: color.a,
        }
    }
}

/// Attributes shared by linear and radial gradients
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GradientBase {
    pub href: Option<PaintServerId>,
    pub units: Option<Units>,
    pub transform: Option<Affine>,
    pub spread: Option<SpreadMethod>,
    pub stops: Vec<GradientStop>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearGradient {
    pub base: GradientBase,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RadialGradient {
    pub base: GradientBase,
    pub cx: Option<f64>,
    pub cy: Option<f64>,
    pub r: Option<f64>,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

/// Tiling pattern; unset attributes come from the `href` chain
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pattern {
    pub href: Option<PaintServerId>,
    pub units: Option<Units>,
    pub content_units: Option<Units>,
    pub transform: Option<Affine>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub view_box: Option<Rect>,
    pub aspect: Option<AspectRatio>,
    pub overflow_visible: bool,
    pub children: Vec<ItemId>,
}

/// One stroked line repeated along a hatch
#[derive(Clone, Debug, PartialEq)]
pub struct HatchPath {
    /// Horizontal offset inside the strip
    pub offset: f64,
    /// Custom geometry; a vertical line through the strip when absent
    pub data: Option<PathVector>,
    pub style: Style,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hatch {
    pub units: Units,
    pub content_units: Units,
    pub transform: Affine,
    pub x: f64,
    pub y: f64,
    pub pitch: f64,
    /// Rotation in degrees
    pub rotate: f64,
    pub overflow_visible: bool,
    pub paths: Vec<HatchPath>,
}

impl Default for Hatch {
    fn default() -> Self {
        Self {
            units: Units::ObjectBoundingBox,
            content_units: Units::UserSpaceOnUse,
            transform: Affine::IDENTITY,
            x: 0.0,
            y: 0.0,
            pitch: 0.0,
            rotate: 0.0,
            overflow_visible: false,
            paths: Vec::new(),
        }
    }
}

/// Closed set of paint server kinds
#[derive(Clone, Debug, PartialEq)]
pub enum PaintServer {
    Solid { color: Color, opacity: f32 },
    Linear(LinearGradient),
    Radial(RadialGradient),
    Pattern(Pattern),
    Hatch(Hatch),
}

impl PaintServer {
    fn href(&self) -> Option<PaintServerId> {
        match self {
            PaintServer::Linear(g) => g.base.href,
            PaintServer::Radial(g) => g.base.href,
            PaintServer::Pattern(p) => p.href,
            _ => None,
        }
    }

    fn gradient_base(&self) -> Option<&GradientBase> {
        match self {
            PaintServer::Linear(g) => Some(&g.base),
            PaintServer::Radial(g) => Some(&g.base),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved values
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedLinear {
    pub units: Units,
    pub transform: Affine,
    pub spread: SpreadMethod,
    pub start: Point,
    pub end: Point,
    pub stops: Vec<GradientStop>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedRadial {
    pub units: Units,
    pub transform: Affine,
    pub spread: SpreadMethod,
    pub center: Point,
    pub radius: f64,
    pub focal: Point,
    pub stops: Vec<GradientStop>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPattern {
    pub units: Units,
    pub content_units: Units,
    pub transform: Affine,
    pub rect: Rect,
    pub view_box: Option<Rect>,
    pub aspect: AspectRatio,
    pub overflow_visible: bool,
    /// Children of the first pattern in the chain that has any
    pub children: Vec<ItemId>,
}

/// First value produced by `get` along the chain
fn inherit<T>(
    doc: &Document,
    chain: &[PaintServerId],
    get: impl Fn(&PaintServer) -> Option<T>,
) -> Option<T> {
    chain
        .iter()
        .filter_map(|id| doc.paint_server(*id))
        .find_map(get)
}

impl Document {
    /// `id` followed by its href ancestors; errors on cycles and dangling links
    pub fn href_chain(&self, id: PaintServerId) -> Result<SmallVec<[PaintServerId; 4]>> {
        let mut chain: SmallVec<[PaintServerId; 4]> = SmallVec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if chain.contains(&current) || chain.len() >= MAX_HREF_CHAIN {
                return Err(CoreError::ReferenceCycle(format!("{current:?}")));
            }
            let server = self
                .paint_server(current)
                .ok_or_else(|| CoreError::UnknownReference(format!("{current:?}")))?;
            chain.push(current);
            next = server.href();
        }
        Ok(chain)
    }

    /// Stops of the first gradient in the chain that has any
    pub fn resolve_stops(&self, id: PaintServerId) -> Result<Vec<GradientStop>> {
        let chain = self.href_chain(id)?;
        Ok(inherit(self, &chain, |s| {
            s.gradient_base()
                .filter(|b| !b.stops.is_empty())
                .map(|b| b.stops.clone())
        })
        .unwrap_or_default())
    }

    pub fn resolve_linear(&self, id: PaintServerId) -> Result<ResolvedLinear> {
        let chain = self.href_chain(id)?;
        let coord = |get: fn(&LinearGradient) -> Option<f64>| {
            inherit(self, &chain, |s| match s {
                PaintServer::Linear(g) => get(g),
                _ => None,
            })
        };
        Ok(ResolvedLinear {
            units: inherit(self, &chain, |s| s.gradient_base().and_then(|b| b.units))
                .unwrap_or(Units::ObjectBoundingBox),
            transform: inherit(self, &chain, |s| s.gradient_base().and_then(|b| b.transform))
                .unwrap_or_default(),
            spread: inherit(self, &chain, |s| s.gradient_base().and_then(|b| b.spread))
                .unwrap_or_default(),
            start: Point::new(
                coord(|g| g.x1).unwrap_or(0.0),
                coord(|g| g.y1).unwrap_or(0.0),
            ),
            end: Point::new(
                coord(|g| g.x2).unwrap_or(1.0),
                coord(|g| g.y2).unwrap_or(0.0),
            ),
            stops: self.resolve_stops(id)?,
        })
    }

    pub fn resolve_radial(&self, id: PaintServerId) -> Result<ResolvedRadial> {
        let chain = self.href_chain(id)?;
        let coord = |get: fn(&RadialGradient) -> Option<f64>| {
            inherit(self, &chain, |s| match s {
                PaintServer::Radial(g) => get(g),
                _ => None,
            })
        };
        let center = Point::new(
            coord(|g| g.cx).unwrap_or(0.5),
            coord(|g| g.cy).unwrap_or(0.5),
        );
        Ok(ResolvedRadial {
            units: inherit(self, &chain, |s| s.gradient_base().and_then(|b| b.units))
                .unwrap_or(Units::ObjectBoundingBox),
            transform: inherit(self, &chain, |s| s.gradient_base().and_then(|b| b.transform))
                .unwrap_or_default(),
            spread: inherit(self, &chain, |s| s.gradient_base().and_then(|b| b.spread))
                .unwrap_or_default(),
            center,
            radius: coord(|g| g.r).unwrap_or(0.5),
            focal: Point::new(
                coord(|g| g.fx).unwrap_or(center.x),
                coord(|g| g.fy).unwrap_or(center.y),
            ),
            stops: self.resolve_stops(id)?,
        })
    }

    pub fn resolve_pattern(&self, id: PaintServerId) -> Result<ResolvedPattern> {
        let chain = self.href_chain(id)?;
        let attr = |get: fn(&Pattern) -> Option<f64>| {
            inherit(self, &chain, |s| match s {
                PaintServer::Pattern(p) => get(p),
                _ => None,
            })
        };
        let overflow_visible = inherit(self, &chain, |s| match s {
            PaintServer::Pattern(p) => Some(p.overflow_visible),
            _ => None,
        })
        .ok_or_else(|| CoreError::UnknownReference(format!("{id:?} is not a pattern")))?;

        Ok(ResolvedPattern {
            units: inherit(self, &chain, |s| match s {
                PaintServer::Pattern(p) => p.units,
                _ => None,
            })
            .unwrap_or(Units::ObjectBoundingBox),
            content_units: inherit(self, &chain, |s| match s {
                PaintServer::Pattern(p) => p.content_units,
                _ => None,
            })
            .unwrap_or(Units::UserSpaceOnUse),
            transform: inherit(self, &chain, |s| match s {
                PaintServer::Pattern(p) => p.transform,
                _ => None,
            })
            .unwrap_or_default(),
            rect: Rect::new(
                attr(|p| p.x).unwrap_or(0.0),
                attr(|p| p.y).unwrap_or(0.0),
                attr(|p| p.width).unwrap_or(0.0),
                attr(|p| p.height).unwrap_or(0.0),
            ),
            view_box: inherit(self, &chain, |s| match s {
                PaintServer::Pattern(p) => p.view_box,
                _ => None,
            }),
            aspect: inherit(self, &chain, |s| match s {
                PaintServer::Pattern(p) => p.aspect,
                _ => None,
            })
            .unwrap_or_default(),
            overflow_visible,
            children: inherit(self, &chain, |s| match s {
                PaintServer::Pattern(p) if !p.children.is_empty() => Some(p.children.clone()),
                _ => None,
            })
            .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;

    fn stop(offset: f32, color: Color) -> GradientStop {
        GradientStop::new(offset, color)
    }

    #[test]
    fn test_stops_inherited_through_href() {
        let mut doc = Document::new(Size::new(10.0, 10.0));
        let template = doc.add_paint_server(PaintServer::Linear(LinearGradient {
            base: GradientBase {
                stops: vec![stop(0.0, Color::RED), stop(1.0, Color::BLUE)],
                spread: Some(SpreadMethod::Reflect),
                ..Default::default()
            },
            ..Default::default()
        }));
        let user = doc.add_paint_server(PaintServer::Linear(LinearGradient {
            base: GradientBase {
                href: Some(template),
                ..Default::default()
            },
            x2: Some(0.0),
            y2: Some(1.0),
            ..Default::default()
        }));

        let resolved = doc.resolve_linear(user).unwrap();
        assert_eq!(resolved.stops.len(), 2);
        assert_eq!(resolved.spread, SpreadMethod::Reflect);
        assert_eq!(resolved.end, Point::new(0.0, 1.0));
        assert_eq!(resolved.units, Units::ObjectBoundingBox);
    }

    #[test]
    fn test_pattern_href_cycle_is_rejected() {
        let mut doc = Document::new(Size::new(10.0, 10.0));
        let a = doc.add_paint_server(PaintServer::Pattern(Pattern::default()));
        let b = doc.add_paint_server(PaintServer::Pattern(Pattern {
            href: Some(a),
            ..Default::default()
        }));
        if let Some(PaintServer::Pattern(p)) = doc.paint_server_mut(a) {
            p.href = Some(b);
        }
        assert!(matches!(
            doc.resolve_pattern(a),
            Err(CoreError::ReferenceCycle(_))
        ));
    }

    #[test]
    fn test_pattern_children_from_template() {
        let mut doc = Document::new(Size::new(10.0, 10.0));
        let child = doc.add_detached(crate::document::Item::default());
        let template = doc.add_paint_server(PaintServer::Pattern(Pattern {
            width: Some(2.0),
            height: Some(3.0),
            children: vec![child],
            ..Default::default()
        }));
        let user = doc.add_paint_server(PaintServer::Pattern(Pattern {
            href: Some(template),
            x: Some(1.0),
            ..Default::default()
        }));
        let resolved = doc.resolve_pattern(user).unwrap();
        assert_eq!(resolved.children, vec![child]);
        assert_eq!(resolved.rect, Rect::new(1.0, 0.0, 2.0, 3.0));
    }
}
