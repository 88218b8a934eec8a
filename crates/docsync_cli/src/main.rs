//! docsync CLI
//!
//! Runs repair passes between stores described by a config file.
//!
//! # Commands
//!
//! - `repair` - Reconcile the configured local and remote stores once
//! - `codes` - List the report codes
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docsync replication tools.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the configured stores once
    Repair {
        /// Path to the JSON config file
        #[arg(short, long)]
        config: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List report codes with their names and severities
    Codes {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so reports can be piped
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Repair { config, format } => {
            commands::repair::run(&config, &format)?;
        }
        Commands::Codes { format } => {
            commands::codes::run(&format)?;
        }
        Commands::Version => {
            println!("docsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
