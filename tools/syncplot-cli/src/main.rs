//! SyncPlot CLI: synchronize sensor recordings to a video and render them.
//!
//! Usage:
//!   syncplot render <CONFIG>...     Render the composite video
//!   syncplot offsets <CONFIG>...    Print the computed stream offsets
//!   syncplot validate <CONFIG>...   Validate job files
//!   syncplot check                  Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use syncplot_common::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "syncplot",
    about = "Render sensor plots synchronized to a video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render sensor plots next to the video
    Render {
        /// Job files, merged in order
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Output file path (overrides target_file_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute and print the offset of every sensor stream
    Offsets {
        /// Job files, merged in order
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Validate job files and the inputs they reference
    Validate {
        /// Job files, merged in order
        #[arg(required = true)]
        configs: Vec<PathBuf>,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::load();

    // Initialize logging
    let mut logging = app_config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    syncplot_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render { configs, output } => {
            commands::render::run(configs, output, app_config.tools).await
        }
        Commands::Offsets { configs, json } => commands::offsets::run(configs, json),
        Commands::Validate { configs } => commands::validate::run(configs),
        Commands::Check => commands::check::run(&app_config),
    }
}
