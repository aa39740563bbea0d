//! Render and export configuration

use std::str::FromStr;

use vellum_core::Color;

/// How text is written to the output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextMode {
    /// Native glyph show (Type 3 fonts on PDF, outline fill on raster)
    #[default]
    Embed,
    /// Glyph outlines filled and stroked as paths
    Path,
    /// Skipped on vector pages, drawn as paths on raster targets
    Omit,
}

impl FromStr for TextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embed" => Ok(TextMode::Embed),
            "path" => Ok(TextMode::Path),
            "omit" => Ok(TextMode::Omit),
            other => Err(format!("unknown text mode '{other}' (expected embed, path or omit)")),
        }
    }
}

/// Highest PDF feature level the page writer may use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PdfLevel {
    /// No transparency: constant alpha, soft masks and groups are dropped
    V1_3,
    #[default]
    V1_4,
}

impl PdfLevel {
    pub fn version(&self) -> &'static str {
        match self {
            PdfLevel::V1_3 => "1.3",
            PdfLevel::V1_4 => "1.4",
        }
    }

    pub fn supports_transparency(&self) -> bool {
        *self >= PdfLevel::V1_4
    }
}

impl FromStr for PdfLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("PDF-").trim_start_matches("PDF ") {
            "1.3" => Ok(PdfLevel::V1_3),
            "1.4" => Ok(PdfLevel::V1_4),
            other => Err(format!("unsupported PDF level '{other}' (expected 1.3 or 1.4)")),
        }
    }
}

/// Which part of the document is exported
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportArea {
    /// The declared page box
    #[default]
    Page,
    /// Tight visual bounds of the exported subtree
    Drawing,
}

impl FromStr for ExportArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(ExportArea::Page),
            "drawing" => Ok(ExportArea::Drawing),
            other => Err(format!("unknown export area '{other}' (expected page or drawing)")),
        }
    }
}

/// Pixel layout of a raster target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB with alpha
    #[default]
    Argb32,
    /// Opaque RGB, painted over a white background
    Rgb24,
    /// Coverage only
    A8,
}

impl PixelFormat {
    pub fn has_alpha(&self) -> bool {
        !matches!(self, PixelFormat::Rgb24)
    }
}

/// Options consumed by the render context and tree walker
#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub text_mode: TextMode,
    pub pdf_level: PdfLevel,
    /// Rasterize filtered items instead of drawing them without the effect
    pub filters_to_bitmap: bool,
    /// Resolution of rasterized filters and vector-page masks
    pub bitmap_dpi: f64,
    /// Fold leaf opacity into paint alpha instead of compositing a layer
    pub merge_opacity: bool,
    /// Off-screen tile pixels per device pixel
    pub tile_oversample: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            text_mode: TextMode::Embed,
            pdf_level: PdfLevel::V1_4,
            filters_to_bitmap: true,
            bitmap_dpi: 96.0,
            merge_opacity: true,
            tile_oversample: 4.0,
        }
    }
}

/// Options read once by an output adapter
#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub area: ExportArea,
    /// Page margin added on every side, in document units
    pub bleed: f64,
    /// Raster resolution; document units are 1/96 in
    pub dpi: f64,
    pub pixel_format: PixelFormat,
    /// Render only the item with this id
    pub export_id: Option<String>,
    /// Background painted under the drawing; opaque formats default to white
    pub background: Option<Color>,
    pub render: RenderOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            area: ExportArea::Page,
            bleed: 0.0,
            dpi: 96.0,
            pixel_format: PixelFormat::Argb32,
            export_id: None,
            background: None,
            render: RenderOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("path".parse::<TextMode>(), Ok(TextMode::Path));
        assert_eq!("PDF-1.3".parse::<PdfLevel>(), Ok(PdfLevel::V1_3));
        assert_eq!("drawing".parse::<ExportArea>(), Ok(ExportArea::Drawing));
        assert!("1.7".parse::<PdfLevel>().is_err());
    }

    #[test]
    fn test_level_ordering() {
        assert!(PdfLevel::V1_4.supports_transparency());
        assert!(!PdfLevel::V1_3.supports_transparency());
    }
}
