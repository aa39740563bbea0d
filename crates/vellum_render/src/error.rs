//! Render errors

use thiserror::Error;

use crate::context::Phase;

/// Errors that fail an export
///
/// Resource problems in the middle of a render (missing paint servers,
/// fonts, images) are not errors: they are logged and skipped.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to bind surface: {0}")]
    Bind(String),

    #[error("Render context is already bound")]
    AlreadyBound,

    #[error("Render context is not bound to a surface")]
    NotBound,

    #[error("Render context is finished")]
    Finished,

    #[error("Invalid operation in {phase:?}: {op}")]
    InvalidState { phase: Phase, op: &'static str },

    #[error("Unbalanced {0} stack")]
    Unbalanced(&'static str),

    #[error("No item with id '{0}'")]
    InvalidExportId(String),

    #[error("Nothing to export: drawing is empty")]
    EmptyDrawing,

    #[error("Nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] vellum_image::ImageError),

    #[error("Document error: {0}")]
    Core(#[from] vellum_core::CoreError),
}

pub type Result<T> = std::result::Result<T, RenderError>;
