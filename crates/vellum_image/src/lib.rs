//! Vellum Image
//!
//! Raster images for Vellum exports.
//!
//! # Features
//!
//! - **Sources**: file paths, `data:` URIs, encoded bytes, raw RGBA pixels
//! - **Decoding**: PNG and JPEG to premultiplied RGBA8
//! - **Placement**: `preserveAspectRatio` fitting with slice clipping
//! - **Encoding**: PNG output of finished raster surfaces

mod error;
mod loader;
mod placement;
mod source;

pub use error::{ImageError, Result};
pub use loader::{demultiply, encode_png, premultiply, ImageData, PngChannels};
pub use placement::{place_image, ImagePlacement};
pub use source::{decode_data_uri, ImageFormat, ImageSource};
