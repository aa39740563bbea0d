//! Core error types

use thiserror::Error;

/// Errors raised while building or querying a document
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid path data at byte {offset}: {message}")]
    PathData { offset: usize, message: String },

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    #[error("Reference cycle through {0}")]
    ReferenceCycle(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Malformed scene: {0}")]
    Scene(String),

    #[error("Failed to parse scene JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
