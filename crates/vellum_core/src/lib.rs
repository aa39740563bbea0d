//! Vellum Core
//!
//! Geometry and document model shared by the renderer and the layout engines.
//!
//! # Modules
//!
//! - `geometry`: points, rectangles, affine transforms
//! - `path` / `path_data`: path vectors and SVG path data
//! - `document`: the retained item tree and its resources
//! - `paint_server`: gradients, patterns, hatches and href inheritance
//! - `scene`: JSON scene files

pub mod aspect;
pub mod color;
pub mod document;
pub mod error;
pub mod geometry;
pub mod paint_server;
pub mod path;
pub mod path_data;
pub mod scene;
pub mod style;

pub use aspect::{Align, AspectRatio};
pub use color::Color;
pub use document::{
    BBoxKind, ClipPath, ClipPathId, Connector, Document, FontId, FontSource, Glyph, ImageItem,
    ImageRef, Item, ItemId, ItemKind, Mask, MaskId, OutlineGlyph, PaintServerId, TextRun, UseItem,
};
pub use error::{CoreError, Result};
pub use geometry::{Affine, Point, Rect, Size};
pub use paint_server::{
    GradientBase, GradientStop, Hatch, HatchPath, LinearGradient, PaintServer, Pattern,
    RadialGradient, ResolvedLinear, ResolvedPattern, ResolvedRadial,
};
pub use path::{PathBuilder, PathVector, Segment, SubPath};
pub use path_data::{format_path_data, parse_path_data};
pub use scene::{LoadedScene, SceneFile};
pub use style::{
    FillRule, ImageRendering, LineCap, LineJoin, Paint, SpreadMethod, Style, Units,
};
