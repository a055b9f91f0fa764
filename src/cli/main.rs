//! CLI binary entry point for target-redshift
//!
//! # Usage
//!
//! ```bash
//! # Create the schema and metadata table (and a sample config)
//! target-redshift init --write-config
//!
//! # Load JSON-lines batches
//! target-redshift load batches.jsonl
//! cat batches.jsonl | target-redshift load -
//!
//! # Swap in a fully loaded table version
//! target-redshift activate --table cats --version 2
//! ```

mod commands;
mod error;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::activate::{ActivateArgs, handle_activate};
use commands::init::{InitArgs, handle_init};
use commands::load::{LoadArgs, handle_load};

#[derive(Parser)]
#[command(name = "target-redshift")]
#[command(about = "Load schema-tagged batches into Redshift or DuckDB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory or target-redshift.toml file
    #[arg(short, long, default_value = ".", global = true)]
    config: PathBuf,

    /// Log filter (RUST_LOG syntax); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Load JSON-lines batches from a file or stdin
    Load {
        /// Input file path or '-' for stdin
        #[arg(default_value = "-")]
        input: String,
    },
    /// Replace a table with its loaded shadow table of a version
    Activate {
        /// Stream (table) name
        #[arg(short, long)]
        table: String,
        /// Version to activate
        #[arg(short, long)]
        version: i64,
    },
    /// Create the target schema and metadata table
    Init {
        /// Write a sample target-redshift.toml if none exists
        #[arg(long)]
        write_config: bool,
    },
    /// Print a sample configuration file
    SampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Load { input } => {
            handle_load(&LoadArgs {
                config: cli.config,
                input,
            })
            .await?
        }
        Commands::Activate { table, version } => {
            handle_activate(&ActivateArgs {
                config: cli.config,
                table,
                version,
            })
            .await?
        }
        Commands::Init { write_config } => {
            handle_init(&InitArgs {
                config: cli.config,
                write_config,
            })
            .await?
        }
        Commands::SampleConfig => {
            print!("{}", target_redshift::database::config::sample_config());
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber, logging to stderr
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();

    Ok(())
}
