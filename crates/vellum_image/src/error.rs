//! Image errors

use thiserror::Error;

/// Errors from loading or encoding images
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to read image file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

impl From<image::ImageError> for ImageError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Encoding(_) => ImageError::Encode(e.to_string()),
            other => ImageError::Decode(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;
