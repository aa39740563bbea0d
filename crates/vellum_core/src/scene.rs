//! JSON scene files
//!
//! A scene file is a serde mirror of the document tree that references
//! resources by string id. [`SceneFile::to_document`] resolves those ids into
//! arena handles; [`SceneFile::store_geometry`] writes transforms and
//! connector routes back after a layout pass.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::aspect::AspectRatio;
use crate::color::Color;
use crate::document::{
    ClipPath, ClipPathId, Connector, Document, FontId, FontSource, Glyph, ImageItem, ImageRef,
    Item, ItemId, ItemKind, Mask, MaskId, OutlineGlyph, PaintServerId, TextRun, UseItem,
};
use crate::error::{CoreError, Result};
use crate::geometry::{Affine, Rect, Size};
use crate::paint_server::{
    GradientBase, GradientStop, Hatch, HatchPath, LinearGradient, PaintServer, Pattern,
    RadialGradient,
};
use crate::path::PathVector;
use crate::path_data::{format_path_data, parse_path_data};
use crate::style::{
    FillRule, ImageRendering, LineCap, LineJoin, Paint, SpreadMethod, Style, Units,
};

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

// ─────────────────────────────────────────────────────────────────────────────
// File format
// ─────────────────────────────────────────────────────────────────────────────

/// Root of a scene file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFile {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub defs: SceneDefs,
    #[serde(default)]
    pub items: Vec<SceneItem>,
    /// Directory relative file references resolve against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDefs {
    #[serde(default)]
    pub paint_servers: Vec<ScenePaintServer>,
    #[serde(default)]
    pub clip_paths: Vec<SceneClipPath>,
    #[serde(default)]
    pub masks: Vec<SceneMask>,
    #[serde(default)]
    pub fonts: Vec<SceneFont>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScenePaintServer {
    Solid(SceneSolid),
    LinearGradient(SceneLinear),
    RadialGradient(SceneRadial),
    Pattern(ScenePattern),
    Hatch(SceneHatch),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSolid {
    pub id: String,
    pub color: String,
    #[serde(default = "default_one")]
    pub opacity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneStop {
    pub offset: f32,
    pub color: String,
    #[serde(default = "default_one")]
    pub opacity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneLinear {
    pub id: String,
    pub href: Option<String>,
    pub units: Option<Units>,
    pub transform: Option<[f64; 6]>,
    pub spread: Option<SpreadMethod>,
    #[serde(default)]
    pub stops: Vec<SceneStop>,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRadial {
    pub id: String,
    pub href: Option<String>,
    pub units: Option<Units>,
    pub transform: Option<[f64; 6]>,
    pub spread: Option<SpreadMethod>,
    #[serde(default)]
    pub stops: Vec<SceneStop>,
    pub cx: Option<f64>,
    pub cy: Option<f64>,
    pub r: Option<f64>,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePattern {
    pub id: String,
    pub href: Option<String>,
    pub units: Option<Units>,
    pub content_units: Option<Units>,
    pub transform: Option<[f64; 6]>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub view_box: Option<[f64; 4]>,
    pub preserve_aspect_ratio: Option<String>,
    #[serde(default)]
    pub overflow_visible: bool,
    #[serde(default)]
    pub children: Vec<SceneItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneHatch {
    pub id: String,
    pub units: Option<Units>,
    pub content_units: Option<Units>,
    pub transform: Option<[f64; 6]>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub pitch: f64,
    #[serde(default)]
    pub rotate: f64,
    #[serde(default)]
    pub overflow_visible: bool,
    #[serde(default)]
    pub paths: Vec<SceneHatchPath>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneHatchPath {
    #[serde(default)]
    pub offset: f64,
    pub d: Option<String>,
    #[serde(default)]
    pub style: SceneStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneClipPath {
    pub id: String,
    pub units: Option<Units>,
    pub transform: Option<[f64; 6]>,
    pub clip_path: Option<String>,
    #[serde(default)]
    pub children: Vec<SceneItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMask {
    pub id: String,
    pub units: Option<Units>,
    pub content_units: Option<Units>,
    /// x, y, width, height in `units`
    pub region: Option<[f64; 4]>,
    #[serde(default)]
    pub children: Vec<SceneItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFont {
    pub id: String,
    pub file: Option<String>,
    #[serde(default)]
    pub index: u32,
    pub family: Option<String>,
    pub units_per_em: Option<f64>,
    #[serde(default)]
    pub ascent: f64,
    #[serde(default)]
    pub descent: f64,
    #[serde(default)]
    pub glyphs: Vec<SceneOutlineGlyph>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneOutlineGlyph {
    pub id: u32,
    pub d: String,
    pub advance: f64,
}

/// CSS-like presentation properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SceneStyle {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub opacity: Option<f32>,
    pub fill_opacity: Option<f32>,
    pub stroke_opacity: Option<f32>,
    pub fill_rule: Option<FillRule>,
    pub clip_rule: Option<FillRule>,
    pub stroke_width: Option<f64>,
    pub stroke_linecap: Option<LineCap>,
    pub stroke_linejoin: Option<LineJoin>,
    pub stroke_miterlimit: Option<f64>,
    pub stroke_dasharray: Option<Vec<f64>>,
    pub stroke_dashoffset: Option<f64>,
    pub image_rendering: Option<ImageRendering>,
    pub overflow: Option<String>,
}

/// One item with its shared attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    pub id: Option<String>,
    pub transform: Option<[f64; 6]>,
    #[serde(default)]
    pub style: SceneStyle,
    pub clip_path: Option<String>,
    pub mask: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub printable: bool,
    #[serde(default)]
    pub filter: bool,
    #[serde(flatten)]
    pub kind: SceneItemKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SceneItemKind {
    Group {
        #[serde(default)]
        children: Vec<SceneItem>,
    },
    Path {
        d: String,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Ellipse {
        cx: f64,
        cy: f64,
        rx: f64,
        ry: f64,
    },
    Image {
        href: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        #[serde(default, rename = "preserveAspectRatio")]
        preserve_aspect_ratio: Option<String>,
    },
    Text {
        runs: Vec<SceneTextRun>,
    },
    Use {
        href: String,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Connector {
        start: Option<String>,
        end: Option<String>,
        #[serde(default)]
        directed: bool,
        #[serde(default)]
        arrow: bool,
        #[serde(default)]
        d: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneTextRun {
    pub font: String,
    pub size: f64,
    pub glyphs: Vec<SceneGlyph>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneGlyph {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub advance: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

/// A document built from a scene file, plus the bookkeeping needed to write
/// geometry back
pub struct LoadedScene {
    pub document: Document,
    /// Main-tree items in scene pre-order
    order: Vec<ItemId>,
}

impl SceneFile {
    /// Read and parse a scene file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Scene(format!("{}: {e}", path.display())))?;
        let mut scene: SceneFile = serde_json::from_str(&text)?;
        scene.base_dir = path.parent().map(Path::to_path_buf);
        Ok(scene)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the document tree
    pub fn to_document(&self) -> Result<LoadedScene> {
        let mut loader = Loader::new(self);
        loader.load()?;
        Ok(LoadedScene {
            document: loader.doc,
            order: loader.order,
        })
    }

    /// Write item transforms and connector routes back into the scene
    pub fn store_geometry(&mut self, loaded: &LoadedScene) {
        let mut order = loaded.order.iter();
        let doc = &loaded.document;
        fn walk<'a>(
            items: &mut [SceneItem],
            order: &mut impl Iterator<Item = &'a ItemId>,
            doc: &Document,
        ) {
            for scene_item in items {
                let Some(id) = order.next() else {
                    return;
                };
                if let Some(item) = doc.item(*id) {
                    scene_item.transform = (!item.transform.is_identity())
                        .then_some(item.transform.elements);
                    if let (SceneItemKind::Connector { d, .. }, ItemKind::Path(route)) =
                        (&mut scene_item.kind, &item.kind)
                    {
                        *d = Some(format_path_data(route));
                    }
                }
                if let SceneItemKind::Group { children } = &mut scene_item.kind {
                    walk(children, order, doc);
                }
            }
        }
        walk(&mut self.items, &mut order, doc);
    }
}

impl LoadedScene {
    /// Main-tree items in scene order
    pub fn items(&self) -> &[ItemId] {
        &self.order
    }
}

struct Loader<'a> {
    scene: &'a SceneFile,
    doc: Document,
    servers: FxHashMap<&'a str, PaintServerId>,
    clips: FxHashMap<&'a str, ClipPathId>,
    masks: FxHashMap<&'a str, MaskId>,
    fonts: FxHashMap<&'a str, FontId>,
    pending_uses: Vec<(ItemId, &'a str)>,
    pending_connectors: Vec<(ItemId, Option<&'a str>, Option<&'a str>)>,
    order: Vec<ItemId>,
}

fn affine(t: Option<[f64; 6]>) -> Affine {
    t.map(|elements| Affine { elements }).unwrap_or_default()
}

impl<'a> Loader<'a> {
    fn new(scene: &'a SceneFile) -> Self {
        Self {
            scene,
            doc: Document::new(Size::new(scene.width, scene.height)),
            servers: FxHashMap::default(),
            clips: FxHashMap::default(),
            masks: FxHashMap::default(),
            fonts: FxHashMap::default(),
            pending_uses: Vec::new(),
            pending_connectors: Vec::new(),
            order: Vec::new(),
        }
    }

    fn load(&mut self) -> Result<()> {
        let scene: &'a SceneFile = self.scene;
        let defs = &scene.defs;

        // resources first so item styles can reference them
        for font in &defs.fonts {
            let source = self.font_source(font)?;
            let id = self.doc.add_font(source);
            self.fonts.insert(font.id.as_str(), id);
        }
        for server in &defs.paint_servers {
            let (name, value) = self.paint_server_shell(server)?;
            let id = self.doc.add_paint_server(value);
            if self.servers.insert(name, id).is_some() {
                return Err(CoreError::DuplicateId(name.to_string()));
            }
        }
        for clip in &defs.clip_paths {
            let id = self.doc.add_clip_path(ClipPath {
                units: clip.units.unwrap_or_default(),
                transform: affine(clip.transform),
                ..Default::default()
            });
            self.clips.insert(clip.id.as_str(), id);
        }
        for mask in &defs.masks {
            let mut value = Mask {
                units: mask.units.unwrap_or(Units::ObjectBoundingBox),
                content_units: mask.content_units.unwrap_or_default(),
                ..Default::default()
            };
            if let Some([x, y, w, h]) = mask.region {
                value.region = Rect::new(x, y, w, h);
            }
            let id = self.doc.add_mask(value);
            self.masks.insert(mask.id.as_str(), id);
        }

        // hrefs and content, now that every resource has a handle
        for server in &defs.paint_servers {
            self.fill_paint_server(server)?;
        }
        for clip in &defs.clip_paths {
            let children = self.detached_items(&clip.children)?;
            let nested = clip.clip_path.as_deref().map(|n| self.clip_ref(n)).transpose()?;
            if let Some(value) = self.doc.clip_path_mut(self.clips[clip.id.as_str()]) {
                value.children = children;
                value.clip_path = nested;
            }
        }
        for mask in &defs.masks {
            let children = self.detached_items(&mask.children)?;
            if let Some(value) = self.doc.mask_mut(self.masks[mask.id.as_str()]) {
                value.children = children;
            }
        }

        let root = self.doc.root();
        for item in &scene.items {
            self.tree_item(root, item)?;
        }

        self.resolve_pending()
    }

    fn resolve_pending(&mut self) -> Result<()> {
        for (id, name) in std::mem::take(&mut self.pending_uses) {
            let target = self
                .doc
                .find(name)
                .ok_or_else(|| CoreError::UnknownReference(name.to_string()))?;
            if let Some(ItemKind::Use(u)) = self.doc.item_mut(id).map(|i| &mut i.kind) {
                u.target = target;
            }
        }
        for (id, start, end) in std::mem::take(&mut self.pending_connectors) {
            // missing endpoints leave the connector disconnected
            let start = start.and_then(|n| self.doc.find(n));
            let end = end.and_then(|n| self.doc.find(n));
            if let Some(conn) = self.doc.item_mut(id).and_then(|i| i.connector.as_mut()) {
                conn.start = start;
                conn.end = end;
                conn.dirty = start.is_some() && end.is_some();
            }
        }
        Ok(())
    }

    fn resolve_path(&self, file: &str) -> String {
        match &self.scene.base_dir {
            Some(base) if Path::new(file).is_relative() => {
                base.join(file).to_string_lossy().into_owned()
            }
            _ => file.to_string(),
        }
    }

    fn font_source(&self, font: &SceneFont) -> Result<FontSource> {
        if let Some(file) = &font.file {
            return Ok(FontSource::File {
                path: self.resolve_path(file),
                index: font.index,
            });
        }
        if let Some(family) = &font.family {
            return Ok(FontSource::System {
                family: family.clone(),
            });
        }
        let mut glyphs = FxHashMap::default();
        for glyph in &font.glyphs {
            glyphs.insert(
                glyph.id,
                OutlineGlyph {
                    path: parse_path_data(&glyph.d)?,
                    advance: glyph.advance,
                },
            );
        }
        Ok(FontSource::Outlines {
            units_per_em: font.units_per_em.unwrap_or(1000.0),
            ascent: font.ascent,
            descent: font.descent,
            glyphs,
        })
    }

    fn stops(stops: &[SceneStop]) -> Result<Vec<GradientStop>> {
        stops
            .iter()
            .map(|s| {
                let color = parse_color(&s.color)?;
                Ok(GradientStop {
                    offset: s.offset.clamp(0.0, 1.0),
                    color: color.with_alpha(1.0),
                    opacity: s.opacity * color.a,
                })
            })
            .collect()
    }

    /// Paint server without hrefs or children
    fn paint_server_shell(&self, server: &'a ScenePaintServer) -> Result<(&'a str, PaintServer)> {
        Ok(match server {
            ScenePaintServer::Solid(s) => (
                s.id.as_str(),
                PaintServer::Solid {
                    color: parse_color(&s.color)?,
                    opacity: s.opacity,
                },
            ),
            ScenePaintServer::LinearGradient(g) => (
                g.id.as_str(),
                PaintServer::Linear(LinearGradient {
                    base: GradientBase {
                        href: None,
                        units: g.units,
                        transform: g.transform.map(|elements| Affine { elements }),
                        spread: g.spread,
                        stops: Self::stops(&g.stops)?,
                    },
                    x1: g.x1,
                    y1: g.y1,
                    x2: g.x2,
                    y2: g.y2,
                }),
            ),
            ScenePaintServer::RadialGradient(g) => (
                g.id.as_str(),
                PaintServer::Radial(RadialGradient {
                    base: GradientBase {
                        href: None,
                        units: g.units,
                        transform: g.transform.map(|elements| Affine { elements }),
                        spread: g.spread,
                        stops: Self::stops(&g.stops)?,
                    },
                    cx: g.cx,
                    cy: g.cy,
                    r: g.r,
                    fx: g.fx,
                    fy: g.fy,
                }),
            ),
            ScenePaintServer::Pattern(p) => (
                p.id.as_str(),
                PaintServer::Pattern(Pattern {
                    href: None,
                    units: p.units,
                    content_units: p.content_units,
                    transform: p.transform.map(|elements| Affine { elements }),
                    x: p.x,
                    y: p.y,
                    width: p.width,
                    height: p.height,
                    view_box: p.view_box.map(|[x, y, w, h]| Rect::new(x, y, w, h)),
                    aspect: p.preserve_aspect_ratio.as_deref().map(AspectRatio::parse),
                    overflow_visible: p.overflow_visible,
                    children: Vec::new(),
                }),
            ),
            ScenePaintServer::Hatch(h) => (
                h.id.as_str(),
                PaintServer::Hatch(Hatch {
                    units: h.units.unwrap_or(Units::ObjectBoundingBox),
                    content_units: h.content_units.unwrap_or_default(),
                    transform: affine(h.transform),
                    x: h.x,
                    y: h.y,
                    pitch: h.pitch,
                    rotate: h.rotate,
                    overflow_visible: h.overflow_visible,
                    paths: Vec::new(),
                }),
            ),
        })
    }

    fn fill_paint_server(&mut self, server: &'a ScenePaintServer) -> Result<()> {
        match server {
            ScenePaintServer::LinearGradient(g) => {
                let href = g.href.as_deref().map(|h| self.server_ref(h)).transpose()?;
                if let Some(PaintServer::Linear(value)) =
                    self.doc.paint_server_mut(self.servers[g.id.as_str()])
                {
                    value.base.href = href;
                }
            }
            ScenePaintServer::RadialGradient(g) => {
                let href = g.href.as_deref().map(|h| self.server_ref(h)).transpose()?;
                if let Some(PaintServer::Radial(value)) =
                    self.doc.paint_server_mut(self.servers[g.id.as_str()])
                {
                    value.base.href = href;
                }
            }
            ScenePaintServer::Pattern(p) => {
                let href = p.href.as_deref().map(|h| self.server_ref(h)).transpose()?;
                let children = self.detached_items(&p.children)?;
                if let Some(PaintServer::Pattern(value)) =
                    self.doc.paint_server_mut(self.servers[p.id.as_str()])
                {
                    value.href = href;
                    value.children = children;
                }
            }
            ScenePaintServer::Hatch(h) => {
                let mut paths = Vec::with_capacity(h.paths.len());
                for hp in &h.paths {
                    let mut style = self.style(&hp.style)?;
                    if hp.style.stroke.is_none() {
                        style.stroke = Paint::Color(Color::BLACK);
                    }
                    style.fill = Paint::None;
                    paths.push(HatchPath {
                        offset: hp.offset,
                        data: hp.d.as_deref().map(parse_path_data).transpose()?,
                        style,
                    });
                }
                if let Some(PaintServer::Hatch(value)) =
                    self.doc.paint_server_mut(self.servers[h.id.as_str()])
                {
                    value.paths = paths;
                }
            }
            ScenePaintServer::Solid(_) => {}
        }
        Ok(())
    }

    fn server_ref(&self, name: &str) -> Result<PaintServerId> {
        self.servers
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::UnknownReference(name.to_string()))
    }

    fn clip_ref(&self, name: &str) -> Result<ClipPathId> {
        self.clips
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::UnknownReference(name.to_string()))
    }

    fn paint(&self, value: &str) -> Result<Paint> {
        let value = value.trim();
        if value == "none" {
            return Ok(Paint::None);
        }
        if let Some(rest) = value.strip_prefix("url(#") {
            let (name, tail) = rest
                .split_once(')')
                .ok_or_else(|| CoreError::InvalidColor(value.to_string()))?;
            let fallback = match tail.trim() {
                "" | "none" => None,
                color => Some(parse_color(color)?),
            };
            return Ok(Paint::Server {
                id: self.server_ref(name)?,
                fallback,
            });
        }
        Ok(Paint::Color(parse_color(value)?))
    }

    fn style(&self, s: &SceneStyle) -> Result<Style> {
        let mut style = Style::default();
        if let Some(fill) = &s.fill {
            style.fill = self.paint(fill)?;
        }
        if let Some(stroke) = &s.stroke {
            style.stroke = self.paint(stroke)?;
        }
        style.opacity = s.opacity.unwrap_or(1.0).clamp(0.0, 1.0);
        style.fill_opacity = s.fill_opacity.unwrap_or(1.0).clamp(0.0, 1.0);
        style.stroke_opacity = s.stroke_opacity.unwrap_or(1.0).clamp(0.0, 1.0);
        style.fill_rule = s.fill_rule.unwrap_or_default();
        style.clip_rule = s.clip_rule.unwrap_or_default();
        style.stroke_width = s.stroke_width.unwrap_or(1.0);
        style.line_cap = s.stroke_linecap.unwrap_or_default();
        style.line_join = s.stroke_linejoin.unwrap_or_default();
        style.miter_limit = s.stroke_miterlimit.unwrap_or(4.0);
        style.dash_array = s
            .stroke_dasharray
            .as_deref()
            .map(SmallVec::from_slice)
            .unwrap_or_default();
        style.dash_offset = s.stroke_dashoffset.unwrap_or(0.0);
        style.image_rendering = s.image_rendering.unwrap_or_default();
        style.overflow_visible = matches!(s.overflow.as_deref(), Some("visible" | "auto"));
        Ok(style)
    }

    /// Shared attributes plus the kind, children not yet attached
    fn item(&mut self, s: &'a SceneItem) -> Result<Item> {
        let kind = match &s.kind {
            SceneItemKind::Group { .. } => ItemKind::Group(Vec::new()),
            SceneItemKind::Path { d } => ItemKind::Path(parse_path_data(d)?),
            SceneItemKind::Rect {
                x,
                y,
                width,
                height,
            } => ItemKind::Path(PathVector::rect(Rect::new(*x, *y, *width, *height))),
            SceneItemKind::Ellipse { cx, cy, rx, ry } => {
                ItemKind::Path(PathVector::ellipse(*cx, *cy, *rx, *ry))
            }
            SceneItemKind::Image {
                href,
                x,
                y,
                width,
                height,
                preserve_aspect_ratio,
            } => ItemKind::Image(ImageItem {
                source: ImageRef::Uri(if href.starts_with("data:") {
                    href.clone()
                } else {
                    self.resolve_path(href)
                }),
                rect: Rect::new(*x, *y, *width, *height),
                aspect: preserve_aspect_ratio
                    .as_deref()
                    .map(AspectRatio::parse)
                    .unwrap_or_default(),
            }),
            SceneItemKind::Text { runs } => {
                let mut out = Vec::with_capacity(runs.len());
                for run in runs {
                    let font = self
                        .fonts
                        .get(run.font.as_str())
                        .copied()
                        .ok_or_else(|| CoreError::UnknownReference(run.font.clone()))?;
                    out.push(TextRun {
                        font,
                        size: run.size,
                        glyphs: run
                            .glyphs
                            .iter()
                            .map(|g| Glyph {
                                id: g.id,
                                x: g.x,
                                y: g.y,
                                advance: g.advance,
                            })
                            .collect(),
                    });
                }
                ItemKind::Text(out)
            }
            // target patched once every item exists
            SceneItemKind::Use { x, y, .. } => ItemKind::Use(UseItem {
                target: ItemId::default(),
                x: *x,
                y: *y,
            }),
            SceneItemKind::Connector { d, .. } => ItemKind::Path(
                d.as_deref()
                    .map(parse_path_data)
                    .transpose()?
                    .unwrap_or_default(),
            ),
        };

        let mut item = Item::new(kind);
        item.name = s.id.clone();
        item.transform = affine(s.transform);
        item.style = self.style(&s.style)?;
        item.clip_path = s.clip_path.as_deref().map(|n| self.clip_ref(n)).transpose()?;
        item.mask = s
            .mask
            .as_deref()
            .map(|n| {
                self.masks
                    .get(n)
                    .copied()
                    .ok_or_else(|| CoreError::UnknownReference(n.to_string()))
            })
            .transpose()?;
        item.visible = s.visible;
        item.printable = s.printable;
        item.filtered = s.filter;
        if let SceneItemKind::Connector {
            directed, arrow, ..
        } = &s.kind
        {
            item.connector = Some(Connector {
                directed: *directed,
                has_arrow: *arrow,
                ..Default::default()
            });
            if s.style.fill.is_none() {
                item.style.fill = Paint::None;
            }
            if s.style.stroke.is_none() {
                item.style.stroke = Paint::Color(Color::BLACK);
            }
        }
        Ok(item)
    }

    fn after_insert(&mut self, id: ItemId, s: &'a SceneItem) {
        match &s.kind {
            SceneItemKind::Use { href, .. } => {
                self.pending_uses.push((id, href.trim_start_matches('#')));
            }
            SceneItemKind::Connector { start, end, .. } => {
                self.pending_connectors
                    .push((id, start.as_deref(), end.as_deref()));
            }
            _ => {}
        }
    }

    fn tree_item(&mut self, parent: ItemId, s: &'a SceneItem) -> Result<()> {
        let item = self.item(s)?;
        let id = self.doc.add_item(parent, item)?;
        self.order.push(id);
        self.after_insert(id, s);
        if let SceneItemKind::Group { children } = &s.kind {
            for child in children {
                self.tree_item(id, child)?;
            }
        }
        Ok(())
    }

    fn detached_items(&mut self, items: &'a [SceneItem]) -> Result<Vec<ItemId>> {
        let mut out = Vec::with_capacity(items.len());
        for s in items {
            out.push(self.detached_item(None, s)?);
        }
        Ok(out)
    }

    fn detached_item(&mut self, parent: Option<ItemId>, s: &'a SceneItem) -> Result<ItemId> {
        let item = self.item(s)?;
        let id = match parent {
            Some(group) => self.doc.add_detached_child(group, item)?,
            None => self.doc.add_detached(item),
        };
        self.after_insert(id, s);
        if let SceneItemKind::Group { children } = &s.kind {
            for child in children {
                self.detached_item(Some(id), child)?;
            }
        }
        Ok(id)
    }
}

fn parse_color(value: &str) -> Result<Color> {
    Color::parse(value).ok_or_else(|| CoreError::InvalidColor(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint_server::PaintServer;

    const SCENE: &str = r##"{
        "width": 100, "height": 50,
        "defs": {
            "paintServers": [
                {"type": "linearGradient", "id": "base", "stops": [
                    {"offset": 0, "color": "#ff0000"},
                    {"offset": 1, "color": "#0000ff", "opacity": 0.5}
                ]},
                {"type": "linearGradient", "id": "g", "href": "base", "x2": 0, "y2": 1}
            ],
            "clipPaths": [
                {"id": "c", "children": [{"type": "rect", "x": 0, "y": 0, "width": 5, "height": 5}]}
            ]
        },
        "items": [
            {"type": "rect", "id": "a", "x": 0, "y": 0, "width": 10, "height": 10,
             "style": {"fill": "url(#g) #00ff00", "stroke-width": 2}, "clipPath": "c"},
            {"type": "group", "id": "grp", "children": [
                {"type": "use", "id": "u", "href": "#a", "x": 20}
            ]},
            {"type": "connector", "id": "k", "start": "a", "end": "grp", "directed": true}
        ]
    }"##;

    #[test]
    fn test_load_resolves_references() {
        let scene = SceneFile::from_json(SCENE).unwrap();
        let loaded = scene.to_document().unwrap();
        let doc = &loaded.document;

        let a = doc.find("a").unwrap();
        let item = doc.item(a).unwrap();
        assert!(item.clip_path.is_some());
        let Paint::Server { id, fallback } = item.style.fill else {
            panic!("expected a paint server");
        };
        assert_eq!(fallback, Some(Color::GREEN));
        assert!(matches!(doc.paint_server(id), Some(PaintServer::Linear(_))));
        assert_eq!(doc.resolve_stops(id).unwrap().len(), 2);

        let u = doc.find("u").unwrap();
        let ItemKind::Use(use_item) = doc.item(u).unwrap().kind else {
            panic!("expected a use");
        };
        assert_eq!(use_item.target, a);

        let k = doc.find("k").unwrap();
        let conn = doc.item(k).unwrap().connector.unwrap();
        assert_eq!(conn.start, Some(a));
        assert!(conn.directed);
        assert_eq!(loaded.items().len(), 4);
    }

    #[test]
    fn test_store_geometry_writes_transforms() {
        let mut scene = SceneFile::from_json(SCENE).unwrap();
        let mut loaded = scene.to_document().unwrap();
        let a = loaded.document.find("a").unwrap();
        loaded.document.move_rel(a, 3.0, 4.0).unwrap();
        loaded.document.reroute_connectors();
        scene.store_geometry(&loaded);

        assert_eq!(scene.items[0].transform, Some([1.0, 0.0, 0.0, 1.0, 3.0, 4.0]));
        let SceneItemKind::Connector { d, .. } = &scene.items[2].kind else {
            panic!("expected a connector");
        };
        assert!(d.as_deref().is_some_and(|d| d.starts_with('M')));
    }

    #[test]
    fn test_unknown_paint_reference_fails() {
        let json = r##"{"width": 1, "height": 1, "items": [
            {"type": "path", "d": "M0 0", "style": {"fill": "url(#nope)"}}
        ]}"##;
        let scene = SceneFile::from_json(json).unwrap();
        assert!(matches!(
            scene.to_document(),
            Err(CoreError::UnknownReference(_))
        ));
    }
}
