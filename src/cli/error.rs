//! CLI-specific error types

use std::path::PathBuf;
use target_redshift::LoaderError;
use thiserror::Error;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read file {0}: {1}")]
    FileReadError(PathBuf, String),

    #[error("Invalid batch on line {line}: {reason}")]
    InvalidBatch { line: usize, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}
