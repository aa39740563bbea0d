//! Image source types

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use vellum_core::ImageRef;

use crate::error::{ImageError, Result};

/// Source of an image
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Load from a file path
    File(PathBuf),

    /// `data:` URI with base64 or percent-free plain payload
    DataUri(String),

    /// Encoded bytes with an optional format hint
    Bytes {
        data: Vec<u8>,
        format: Option<ImageFormat>,
    },

    /// Straight (non-premultiplied) RGBA8 pixels
    Rgba {
        data: Arc<Vec<u8>>,
        width: u32,
        height: u32,
    },
}

impl ImageSource {
    /// Parse a resource URI string into an ImageSource
    ///
    /// Supported formats:
    /// - `data:image/png;base64,...` - Data URI
    /// - `file:///path/to/image.png` - File URI
    /// - anything else is a file path, resolved against `base_dir` when relative
    pub fn from_uri(uri: &str, base_dir: Option<&Path>) -> Self {
        if uri.starts_with("data:") {
            return Self::DataUri(uri.to_string());
        }
        let path = PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri));
        match base_dir {
            Some(base) if path.is_relative() => Self::File(base.join(path)),
            _ => Self::File(path),
        }
    }

    /// Source for an image reference stored in a document
    pub fn from_ref(image: &ImageRef, base_dir: Option<&Path>) -> Self {
        match image {
            ImageRef::Uri(uri) => Self::from_uri(uri, base_dir),
            ImageRef::Pixels {
                width,
                height,
                rgba,
            } => Self::Rgba {
                data: Arc::clone(rgba),
                width: *width,
                height: *height,
            },
        }
    }
}

/// Split a `data:` URI into its MIME type and decoded payload
pub fn decode_data_uri(uri: &str) -> Result<(Option<String>, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ImageError::InvalidDataUri("missing data: prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::InvalidDataUri("missing ',' separator".to_string()))?;

    let is_base64 = header.ends_with(";base64");
    let mime = header.trim_end_matches(";base64").split(';').next().unwrap_or("");
    let mime = (!mime.is_empty()).then(|| mime.to_string());

    let data = if is_base64 {
        // whitespace is common in data URIs pasted from SVG files
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| ImageError::InvalidDataUri(e.to_string()))?
    } else {
        payload.as_bytes().to_vec()
    };
    Ok((mime, data))
}

/// Image format hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Detect format from MIME type
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub(crate) fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uri_resolves_relative_paths() {
        let source = ImageSource::from_uri("img/a.png", Some(Path::new("/scenes")));
        assert!(matches!(source, ImageSource::File(p) if p == Path::new("/scenes/img/a.png")));

        let source = ImageSource::from_uri("file:///abs/b.png", Some(Path::new("/scenes")));
        assert!(matches!(source, ImageSource::File(p) if p == Path::new("/abs/b.png")));
    }

    #[test]
    fn test_decode_data_uri() {
        let (mime, data) = decode_data_uri("data:text/plain;base64,aGVs bG8=").unwrap();
        assert_eq!(mime.as_deref(), Some("text/plain"));
        assert_eq!(data, b"hello");

        let (mime, data) = decode_data_uri("data:,abc").unwrap();
        assert_eq!(mime, None);
        assert_eq!(data, b"abc");

        assert!(decode_data_uri("data:image/png;base64").is_err());
    }
}
