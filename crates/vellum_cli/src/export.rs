//! `vellum export`

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use vellum_core::{Color, SceneFile};
use vellum_render::{ExportArea, ExportOptions, PdfExport, PdfLevel, RasterExport, TextMode};

use crate::config::ExportConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Png,
    Pdf,
}

impl OutputFormat {
    fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(OutputFormat::Png),
            "pdf" => Some(OutputFormat::Pdf),
            _ => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Scene file (JSON)
    pub scene: PathBuf,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format (defaults to the output extension)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Raster resolution
    #[arg(long)]
    pub dpi: Option<f64>,

    /// Resolution of rasterized filters
    #[arg(long)]
    pub bitmap_dpi: Option<f64>,

    /// page or drawing
    #[arg(long, value_parser = parse_area)]
    pub area: Option<ExportArea>,

    /// Margin around the page, in document units
    #[arg(long)]
    pub bleed: Option<f64>,

    /// embed, path or omit
    #[arg(long, value_parser = parse_text)]
    pub text: Option<TextMode>,

    /// Rasterize items that carry a filter
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub filters_to_bitmap: Option<bool>,

    /// 1.3 or 1.4
    #[arg(long, value_parser = parse_pdf_level)]
    pub pdf_level: Option<PdfLevel>,

    /// Export only the item with this id
    #[arg(long)]
    pub export_id: Option<String>,

    /// Background color (#rrggbb or a keyword)
    #[arg(long, value_parser = parse_color)]
    pub background: Option<Color>,
}

fn parse_area(s: &str) -> Result<ExportArea, String> {
    s.parse()
}

fn parse_text(s: &str) -> Result<TextMode, String> {
    s.parse()
}

fn parse_pdf_level(s: &str) -> Result<PdfLevel, String> {
    s.parse()
}

fn parse_color(s: &str) -> Result<Color, String> {
    Color::parse(s).ok_or_else(|| format!("invalid color '{s}'"))
}

impl ExportArgs {
    /// Config file values with command-line flags on top
    fn options(&self, config: &ExportConfig) -> Result<ExportOptions> {
        let mut options = config.to_options()?;
        if let Some(dpi) = self.dpi {
            options.dpi = dpi;
        }
        if let Some(dpi) = self.bitmap_dpi {
            options.render.bitmap_dpi = dpi;
        }
        if let Some(area) = self.area {
            options.area = area;
        }
        if let Some(bleed) = self.bleed {
            options.bleed = bleed;
        }
        if let Some(text) = self.text {
            options.render.text_mode = text;
        }
        if let Some(filters) = self.filters_to_bitmap {
            options.render.filters_to_bitmap = filters;
        }
        if let Some(level) = self.pdf_level {
            options.render.pdf_level = level;
        }
        if self.export_id.is_some() {
            options.export_id = self.export_id.clone();
        }
        if self.background.is_some() {
            options.background = self.background;
        }
        if !(options.dpi > 0.0 && options.render.bitmap_dpi > 0.0) {
            bail!("Resolution must be positive");
        }
        Ok(options)
    }

    fn format(&self, config: &ExportConfig) -> Result<OutputFormat> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        if let Some(name) = &config.format {
            return OutputFormat::from_str(name, true)
                .map_err(|_| anyhow::anyhow!("Unknown output format '{name}' in config"));
        }
        OutputFormat::from_extension(&self.output).with_context(|| {
            format!(
                "Cannot tell the output format of {}; pass --format png|pdf",
                self.output.display()
            )
        })
    }
}

pub fn run(args: ExportArgs, config: &ExportConfig) -> Result<()> {
    let format = args.format(config)?;
    let options = args.options(config)?;

    let scene = SceneFile::load(&args.scene)
        .with_context(|| format!("Failed to load {}", args.scene.display()))?;
    let loaded = scene
        .to_document()
        .with_context(|| format!("Invalid scene {}", args.scene.display()))?;
    let base_dir = scene.base_dir.as_deref();

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);

    let result = match format {
        OutputFormat::Png => {
            RasterExport::new(options).write_png(&loaded.document, base_dir, &mut out)
        }
        OutputFormat::Pdf => PdfExport::new(options).write(&loaded.document, base_dir, &mut out),
    }
    .and_then(|report| {
        out.flush()?;
        Ok(report)
    });
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            // a failed export leaves no partial file behind
            if let Err(remove) = fs::remove_file(&args.output) {
                tracing::warn!("could not remove {}: {}", args.output.display(), remove);
            }
            return Err(err).with_context(|| format!("Failed to export {}", args.output.display()));
        }
    };

    match report.ink_extents {
        Some(ink) => tracing::info!(
            "wrote {} ({:.0}x{:.0} ink at {:.0},{:.0})",
            args.output.display(),
            ink.width(),
            ink.height(),
            ink.x(),
            ink.y()
        ),
        None => tracing::info!("wrote {} (nothing painted)", args.output.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ExportArgs,
    }

    fn parse(argv: &[&str]) -> ExportArgs {
        let mut full = vec!["vellum"];
        full.extend_from_slice(argv);
        Wrapper::parse_from(full).args
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&["scene.json", "-o", "out.pdf", "--dpi", "300", "--text", "omit"]);
        let config = ExportConfig {
            dpi: 150.0,
            bleed: 5.0,
            ..Default::default()
        };
        let options = args.options(&config).unwrap();
        assert_eq!(options.dpi, 300.0);
        assert_eq!(options.bleed, 5.0);
        assert_eq!(options.render.text_mode, TextMode::Omit);
    }

    #[test]
    fn test_filters_flag_takes_optional_value() {
        let on = parse(&["s.json", "-o", "o.png", "--filters-to-bitmap"]);
        assert_eq!(on.filters_to_bitmap, Some(true));
        let off = parse(&["s.json", "-o", "o.png", "--filters-to-bitmap", "false"]);
        assert_eq!(off.filters_to_bitmap, Some(false));
    }

    #[test]
    fn test_format_from_extension() {
        let config = ExportConfig::default();
        assert_eq!(parse(&["s.json", "-o", "a.PDF"]).format(&config).unwrap(), OutputFormat::Pdf);
        assert_eq!(parse(&["s.json", "-o", "a.png"]).format(&config).unwrap(), OutputFormat::Png);
        assert!(parse(&["s.json", "-o", "a.svg"]).format(&config).is_err());
        let forced = parse(&["s.json", "-o", "a.svg", "--format", "png"]);
        assert_eq!(forced.format(&config).unwrap(), OutputFormat::Png);
    }

    #[test]
    fn test_zero_dpi_is_rejected() {
        let args = parse(&["s.json", "-o", "o.png", "--dpi", "0"]);
        assert!(args.options(&ExportConfig::default()).is_err());
    }
}
