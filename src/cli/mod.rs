mod commands;
mod doctor;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "unibox")]
#[command(about = "Cross-provider social messaging sync", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Run the sync engine (reconciliation loops + webhook gateway)
    Run {
        /// Path to the config file (default: ~/.unibox/config.json)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// Show configuration status
    Status {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// Run system diagnostics
    Doctor {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            commands::init(force)?;
        }
        Commands::Run { config } => {
            commands::run_engine(config.as_deref()).await?;
        }
        Commands::Status { config } => {
            commands::status(config.as_deref())?;
        }
        Commands::Doctor { config } => {
            doctor::doctor_command(config.as_deref()).await?;
        }
    }

    Ok(())
}
