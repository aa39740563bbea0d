//! Font handling for Vellum exports
//!
//! This crate provides:
//! - Font loading and parsing (TTF/OTF via ttf-parser, system fonts via fontdb)
//! - Outline fonts defined inline in a document
//! - Glyph outline extraction and a per-export font cache

pub mod cache;
pub mod face;
pub mod glyphs;

pub use cache::FontCache;
pub use face::{FontFace, FontMetrics};
pub use glyphs::{
    glyph_transform, is_renderable, run_bounds, run_outline, RunOutline, EMPTY_GLYPH,
    UNKNOWN_GLYPH_FLAG,
};

use thiserror::Error;

/// Font errors
#[derive(Error, Debug)]
pub enum TextError {
    #[error("Failed to load font: {0}")]
    FontLoadError(String),

    #[error("Failed to parse font: {0}")]
    FontParseError(String),

    #[error("Invalid font data")]
    InvalidFontData,
}

pub type Result<T> = std::result::Result<T, TextError>;
