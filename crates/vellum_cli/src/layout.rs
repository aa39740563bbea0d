//! `vellum layout`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::fs;
use std::path::PathBuf;

use vellum_core::SceneFile;
use vellum_layout::{graph_layout, remove_overlaps};

use crate::config::LayoutConfig;

#[derive(Subcommand, Debug)]
pub enum LayoutCommand {
    /// Stress-majorization layout along connectors
    Graph(GraphArgs),

    /// Push overlapping items apart
    Overlap(OverlapArgs),
}

#[derive(Args, Debug)]
pub struct SceneIo {
    /// Scene file (JSON)
    pub scene: PathBuf,

    /// Where to write the moved scene
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    #[command(flatten)]
    pub io: SceneIo,

    #[arg(long)]
    pub ideal_length: Option<f64>,

    /// Point arrowed connectors downward
    #[arg(long)]
    pub directed: bool,

    #[arg(long)]
    pub avoid_overlaps: bool,
}

#[derive(Args, Debug)]
pub struct OverlapArgs {
    #[command(flatten)]
    pub io: SceneIo,

    #[arg(long)]
    pub gap_x: Option<f64>,

    #[arg(long)]
    pub gap_y: Option<f64>,
}

pub fn run(command: LayoutCommand, config: &LayoutConfig) -> Result<()> {
    let io = match &command {
        LayoutCommand::Graph(args) => &args.io,
        LayoutCommand::Overlap(args) => &args.io,
    };

    let mut scene = SceneFile::load(&io.scene)
        .with_context(|| format!("Failed to load {}", io.scene.display()))?;
    let mut loaded = scene
        .to_document()
        .with_context(|| format!("Invalid scene {}", io.scene.display()))?;
    let doc = &mut loaded.document;
    let root = doc.root();
    let items = doc.children(root).to_vec();

    match &command {
        LayoutCommand::Graph(args) => {
            let mut options = config.graph_options();
            if let Some(length) = args.ideal_length {
                options.ideal_edge_length = length;
            }
            options.directed |= args.directed;
            options.avoid_overlaps |= args.avoid_overlaps;
            let report = graph_layout(doc, &items, &options).context("Graph layout failed")?;
            tracing::info!(
                "{} components, {} items moved, {} connectors rerouted",
                report.components,
                report.moved,
                report.rerouted
            );
        }
        LayoutCommand::Overlap(args) => {
            let mut options = config.overlap_options();
            if let Some(gap) = args.gap_x {
                options.gap_x = gap;
            }
            if let Some(gap) = args.gap_y {
                options.gap_y = gap;
            }
            let moved = remove_overlaps(doc, &items, &options).context("Overlap removal failed")?;
            tracing::info!("{} items moved", moved);
        }
    }

    scene.store_geometry(&loaded);
    let json = scene.to_json().context("Failed to serialize scene")?;
    fs::write(&io.output, json).with_context(|| format!("Failed to write {}", io.output.display()))?;
    tracing::info!("wrote {}", io.output.display());
    Ok(())
}
