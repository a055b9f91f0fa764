//! Init command
//!
//! Creates the target schema and the metadata table, and optionally writes a
//! sample configuration file.

use std::path::PathBuf;

use target_redshift::database::config::{CONFIG_FILENAME, sample_config};

use super::{build_writer, load_config};
use crate::error::CliError;

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Configuration directory or file
    pub config: PathBuf,
    /// Write a sample configuration into the directory if none exists
    pub write_config: bool,
}

pub async fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    if args.write_config && args.config.is_dir() {
        let path = args.config.join(CONFIG_FILENAME);
        if !path.exists() {
            std::fs::write(&path, sample_config())
                .map_err(|e| CliError::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
            println!("Wrote {}", path.display());
        }
    }

    let (config, base) = load_config(&args.config)?;
    let writer = build_writer(&config, &base).await?;
    writer.initialize().await?;

    println!(
        "Initialized schema '{}' on {}",
        config.warehouse.schema, config.warehouse.backend
    );
    Ok(())
}
