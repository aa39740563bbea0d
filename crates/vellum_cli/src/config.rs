//! Vellum configuration file handling

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use vellum_core::Color;
use vellum_layout::{GraphLayoutOptions, OverlapOptions};
use vellum_render::{ExportOptions, RenderOptions};

pub const CONFIG_FILE: &str = "vellum.toml";

/// Top-level configuration (vellum.toml)
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VellumConfig {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

/// Export settings
#[derive(Debug, Deserialize, Serialize)]
pub struct ExportConfig {
    /// `png` or `pdf`; unset means "from the output extension"
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default = "default_dpi")]
    pub dpi: f64,
    #[serde(default = "default_dpi")]
    pub bitmap_dpi: f64,
    #[serde(default = "default_area")]
    pub area: String,
    #[serde(default)]
    pub bleed: f64,
    #[serde(default = "default_text")]
    pub text: String,
    /// Rasterize filtered items
    #[serde(default = "default_true")]
    pub filters: bool,
    #[serde(default = "default_pdf_level")]
    pub pdf_level: String,
    /// CSS color painted under the drawing
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default = "default_true")]
    pub merge_opacity: bool,
}

fn default_dpi() -> f64 {
    96.0
}

fn default_area() -> String {
    "page".to_string()
}

fn default_text() -> String {
    "embed".to_string()
}

fn default_pdf_level() -> String {
    "1.4".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: None,
            dpi: default_dpi(),
            bitmap_dpi: default_dpi(),
            area: default_area(),
            bleed: 0.0,
            text: default_text(),
            filters: true,
            pdf_level: default_pdf_level(),
            background: None,
            merge_opacity: true,
        }
    }
}

/// Layout settings
#[derive(Debug, Deserialize, Serialize)]
pub struct LayoutConfig {
    #[serde(default = "default_ideal_edge_length")]
    pub ideal_edge_length: f64,
    #[serde(default)]
    pub directed: bool,
    #[serde(default = "default_height_modifier")]
    pub directed_height_modifier: f64,
    #[serde(default)]
    pub avoid_overlaps: bool,
    #[serde(default = "default_connector_spacing")]
    pub connector_spacing: f64,
    #[serde(default)]
    pub gap_x: f64,
    #[serde(default)]
    pub gap_y: f64,
}

fn default_ideal_edge_length() -> f64 {
    100.0
}

fn default_height_modifier() -> f64 {
    1.0
}

fn default_connector_spacing() -> f64 {
    3.0
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            ideal_edge_length: default_ideal_edge_length(),
            directed: false,
            directed_height_modifier: default_height_modifier(),
            avoid_overlaps: false,
            connector_spacing: default_connector_spacing(),
            gap_x: 0.0,
            gap_y: 0.0,
        }
    }
}

impl VellumConfig {
    /// Load an explicit config file, or `vellum.toml` in the current
    /// directory if there is one
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let local = Path::new(CONFIG_FILE);
                if !local.exists() {
                    tracing::debug!("no {} found; using defaults", CONFIG_FILE);
                    return Ok(Self::default());
                }
                local.to_path_buf()
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        tracing::debug!("loaded {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

impl ExportConfig {
    pub fn to_options(&self) -> Result<ExportOptions> {
        let background = match &self.background {
            Some(value) => Some(
                Color::parse(value).with_context(|| format!("Invalid background color '{value}'"))?,
            ),
            None => None,
        };
        Ok(ExportOptions {
            area: self.area.parse().map_err(anyhow::Error::msg)?,
            bleed: self.bleed,
            dpi: self.dpi,
            background,
            render: RenderOptions {
                text_mode: self.text.parse().map_err(anyhow::Error::msg)?,
                pdf_level: self.pdf_level.parse().map_err(anyhow::Error::msg)?,
                filters_to_bitmap: self.filters,
                bitmap_dpi: self.bitmap_dpi,
                merge_opacity: self.merge_opacity,
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

impl LayoutConfig {
    pub fn graph_options(&self) -> GraphLayoutOptions {
        GraphLayoutOptions {
            ideal_edge_length: self.ideal_edge_length,
            directed: self.directed,
            directed_height_modifier: self.directed_height_modifier,
            avoid_overlaps: self.avoid_overlaps,
            connector_spacing: self.connector_spacing,
        }
    }

    pub fn overlap_options(&self) -> OverlapOptions {
        OverlapOptions {
            gap_x: self.gap_x,
            gap_y: self.gap_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_render::{ExportArea, PdfLevel, TextMode};

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = VellumConfig::from_toml("").unwrap();
        assert_eq!(config.export.dpi, 96.0);
        assert!(config.export.filters);
        assert_eq!(config.layout.ideal_edge_length, 100.0);
        assert_eq!(config.layout.connector_spacing, 3.0);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = VellumConfig::from_toml(
            r#"
[export]
dpi = 300
area = "drawing"
text = "path"
pdf_level = "1.3"
background = "white"

[layout]
directed = true
gap_x = 8
"#,
        )
        .unwrap();
        let options = config.export.to_options().unwrap();
        assert_eq!(options.dpi, 300.0);
        assert_eq!(options.area, ExportArea::Drawing);
        assert_eq!(options.render.text_mode, TextMode::Path);
        assert_eq!(options.render.pdf_level, PdfLevel::V1_3);
        assert_eq!(options.background, Some(Color::WHITE));
        assert!(config.layout.graph_options().directed);
        assert_eq!(config.layout.overlap_options().gap_x, 8.0);
    }

    #[test]
    fn test_bad_enum_value_is_reported() {
        let config = VellumConfig::from_toml("[export]\ntext = \"bold\"\n").unwrap();
        let err = config.export.to_options().unwrap_err();
        assert!(err.to_string().contains("unknown text mode"));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let text = VellumConfig::default().to_toml().unwrap();
        let config = VellumConfig::from_toml(&text).unwrap();
        assert_eq!(config.export.pdf_level, "1.4");
    }
}
