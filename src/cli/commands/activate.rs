//! Activate command
//!
//! Swaps the loaded shadow table of a version into place.

use std::path::PathBuf;

use target_redshift::Activation;

use super::{build_writer, load_config};
use crate::error::CliError;

/// Activate command arguments
#[derive(Debug, Clone)]
pub struct ActivateArgs {
    /// Configuration directory or file
    pub config: PathBuf,
    /// Stream (table) name
    pub table: String,
    /// Version to activate
    pub version: i64,
}

pub async fn handle_activate(args: &ActivateArgs) -> Result<(), CliError> {
    let (config, base) = load_config(&args.config)?;
    let writer = build_writer(&config, &base).await?;

    match writer.activate_version(&args.table, args.version).await? {
        Activation::Activated => println!("{}: version {} activated", args.table, args.version),
        Activation::AlreadyActive => {
            println!("{}: version {} is already active", args.table, args.version)
        }
        Activation::Stale => println!(
            "{}: version {} is older than the active version, nothing changed",
            args.table, args.version
        ),
    }

    Ok(())
}
