//! Vellum CLI
//!
//! Export scene files to PNG or PDF and run layout passes over them.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod export;
mod layout;

use export::ExportArgs;
use layout::LayoutCommand;

#[derive(Parser)]
#[command(name = "vellum")]
#[command(author, version, about = "Render and lay out vector scenes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./vellum.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene to PNG or PDF
    Export(ExportArgs),

    /// Move scene items and write the scene back
    Layout {
        #[command(subcommand)]
        command: LayoutCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config::VellumConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Export(args) => export::run(args, &config.export),
        Commands::Layout { command } => layout::run(command, &config.layout),
    }
}
