use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::config::Config;
use clap::{Parser, Subcommand};
use detr::{
    backend::{backend_name, create_device},
    engine::{EngineConfig, MaskPostProcessorConfig},
};

#[derive(Parser)]
#[command(name = "detr")]
#[command(about = "Training and evaluation loops for DETR-style detectors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend information
    Info,

    /// Write a default engine configuration, or check an existing one
    Config {
        /// Configuration file
        #[arg(short, long, default_value = "engine.json")]
        path: PathBuf,

        /// Load and validate the file instead of writing it
        #[arg(long)]
        check: bool,
    },

    /// Write a default mask post-processor configuration
    MaskConfig {
        #[arg(short, long, default_value = "mask_postprocess.json")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    detr::logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info => {
            let device = create_device();
            println!("DETR engine information:");
            println!("  Backend: {}", backend_name());
            println!("  Device: {device:?}");
            Ok(())
        }

        Commands::Config { path, check } => {
            if check {
                let config = EngineConfig::load(&path)
                    .with_context(|| format!("failed to load config file '{}'", path.display()))?;
                config
                    .validate()
                    .with_context(|| format!("invalid config file '{}'", path.display()))?;
                tracing::info!(path = %path.display(), "configuration is valid");
                println!("{config}");
            } else {
                EngineConfig::new()
                    .save(&path)
                    .with_context(|| format!("failed to write config file '{}'", path.display()))?;
                tracing::info!(path = %path.display(), "wrote default configuration");
            }
            Ok(())
        }

        Commands::MaskConfig { path } => {
            MaskPostProcessorConfig::new()
                .save(&path)
                .with_context(|| format!("failed to write config file '{}'", path.display()))?;
            tracing::info!(path = %path.display(), "wrote default mask post-processor configuration");
            Ok(())
        }
    }
}
