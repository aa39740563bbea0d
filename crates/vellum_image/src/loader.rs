//! Image loading and PNG encoding

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::{ImageError, Result};
use crate::source::{decode_data_uri, ImageFormat, ImageSource};

/// Decoded image with premultiplied RGBA8 pixels
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    width: u32,
    height: u32,
    pixels: Arc<Vec<u8>>,
}

impl ImageData {
    /// Load and decode an image from any source
    pub fn load(source: &ImageSource) -> Result<Self> {
        match source {
            ImageSource::File(path) => Self::from_file(path),
            ImageSource::DataUri(uri) => {
                let (mime, data) = decode_data_uri(uri)?;
                Self::from_bytes(&data, mime.as_deref().and_then(ImageFormat::from_mime))
            }
            ImageSource::Bytes { data, format } => Self::from_bytes(data, *format),
            ImageSource::Rgba {
                data,
                width,
                height,
            } => Self::from_rgba(data, *width, *height),
        }
    }

    /// Load an image from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|source| ImageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension);
        Self::from_bytes(&data, format)
    }

    /// Decode encoded bytes, sniffing the format when no hint is given
    pub fn from_bytes(data: &[u8], format: Option<ImageFormat>) -> Result<Self> {
        let img = match format {
            Some(fmt) => image::load_from_memory_with_format(data, fmt.to_image_format())
                .or_else(|_| image::load_from_memory(data))?,
            None => image::load_from_memory(data)?,
        };
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba(rgba.as_raw(), width, height)
    }

    /// Create from straight (non-premultiplied) RGBA8 pixels
    pub fn from_rgba(data: &[u8], width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(ImageError::InvalidDimensions { width, height });
        }
        let mut pixels = data.to_vec();
        premultiply(&mut pixels);
        Ok(Self {
            width,
            height,
            pixels: Arc::new(pixels),
        })
    }

    /// Wrap pixels that are already premultiplied
    pub fn from_premultiplied(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize * 4 {
            return Err(ImageError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels: Arc::new(pixels),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Premultiplied RGBA8 pixels, row-major
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Shared handle to the pixel buffer
    pub fn shared_pixels(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.pixels)
    }

    /// Whether any pixel is not fully opaque
    pub fn has_alpha(&self) -> bool {
        self.pixels.chunks_exact(4).any(|px| px[3] != 255)
    }
}

// ============================================================================
// Premultiplication
// ============================================================================

/// Premultiply straight RGBA8 in place
pub fn premultiply(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
}

/// Undo premultiplication of RGBA8 in place
pub fn demultiply(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        if a == 0 {
            px[..3].fill(0);
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u16 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Channel layout of an encoded PNG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PngChannels {
    /// RGB plus alpha
    #[default]
    Rgba,
    /// Opaque RGB, alpha dropped
    Rgb,
    /// Coverage only, stored as 8-bit gray
    Alpha,
}

/// Encode premultiplied RGBA8 pixels as PNG
pub fn encode_png<W: Write>(
    writer: W,
    premultiplied: &[u8],
    width: u32,
    height: u32,
    channels: PngChannels,
) -> Result<()> {
    if width == 0 || height == 0 || premultiplied.len() != width as usize * height as usize * 4 {
        return Err(ImageError::InvalidDimensions { width, height });
    }

    let (buf, color) = match channels {
        PngChannels::Rgba => {
            let mut straight = premultiplied.to_vec();
            demultiply(&mut straight);
            (straight, ExtendedColorType::Rgba8)
        }
        PngChannels::Rgb => {
            let rgb = premultiplied
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            (rgb, ExtendedColorType::Rgb8)
        }
        PngChannels::Alpha => {
            let alpha = premultiplied.chunks_exact(4).map(|px| px[3]).collect();
            (alpha, ExtendedColorType::L8)
        }
    };

    PngEncoder::new(writer).write_image(&buf, width, height, color)?;
    tracing::debug!("Encoded {}x{} PNG ({:?})", width, height, channels);
    Ok(())
}
