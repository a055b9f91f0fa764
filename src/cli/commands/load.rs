//! Load command
//!
//! Reads `StreamBatch` documents, one JSON object per line, from a file or
//! stdin and writes them in order. Loading stops at the first failed batch;
//! batches written before it stay committed.

use std::io::Read;
use std::path::PathBuf;

use target_redshift::{StreamBatch, WriteOutcome, WriteResult};

use super::{build_writer, load_config};
use crate::error::CliError;

/// Load command arguments
#[derive(Debug, Clone)]
pub struct LoadArgs {
    /// Configuration directory or file
    pub config: PathBuf,
    /// Input file path, or '-' for stdin
    pub input: String,
}

fn read_input(input: &str) -> Result<String, CliError> {
    if input == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .map_err(|e| CliError::IoError(format!("Failed to read stdin: {}", e)))?;
        return Ok(content);
    }

    let path = PathBuf::from(input);
    if !path.exists() {
        return Err(CliError::FileNotFound(path));
    }
    std::fs::read_to_string(&path).map_err(|e| CliError::FileReadError(path, e.to_string()))
}

/// Parse JSON-lines batches, skipping blank lines
pub fn parse_batches(content: &str) -> Result<Vec<StreamBatch>, CliError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| CliError::InvalidBatch {
                line: index + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

pub async fn handle_load(args: &LoadArgs) -> Result<(), CliError> {
    let batches = parse_batches(&read_input(&args.input)?)?;
    let (config, base) = load_config(&args.config)?;

    let writer = build_writer(&config, &base).await?;
    writer.initialize().await?;

    // Each outcome is printed as soon as its batch commits
    for batch in &batches {
        let result = writer.write_batch(batch).await?;
        println!("{}", describe_outcome(&result));
    }

    Ok(())
}

fn describe_outcome(result: &WriteResult) -> String {
    match result.outcome {
        WriteOutcome::Written => format!(
            "{}: {} rows loaded, {} inserted",
            result.table, result.rows_loaded, result.rows_merged
        ),
        WriteOutcome::Stale => format!("{}: stale version, skipped", result.table),
        WriteOutcome::Skipped => format!("{}: empty batch, skipped", result.table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batches() {
        let content = r#"{"stream": "cats", "rows": [{"id": 1}], "schema": {"properties": {"id": {"type": "integer"}}}, "key_properties": ["id"]}

{"stream": "dogs", "version": 2}
"#;
        let batches = parse_batches(content).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].stream, "cats");
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].version, Some(2));
        assert!(batches[1].is_empty());
    }

    #[test]
    fn test_describe_outcome() {
        let result = WriteResult {
            table: "cats".to_string(),
            rows_loaded: 3,
            rows_merged: 2,
            outcome: WriteOutcome::Written,
        };
        assert_eq!(describe_outcome(&result), "cats: 3 rows loaded, 2 inserted");

        let stale = WriteResult {
            outcome: WriteOutcome::Stale,
            ..result
        };
        assert_eq!(describe_outcome(&stale), "cats: stale version, skipped");
    }

    #[test]
    fn test_parse_batches_reports_line() {
        let content = "{\"stream\": \"cats\"}\nnot json\n";
        let err = parse_batches(content).unwrap_err();
        assert!(matches!(err, CliError::InvalidBatch { line: 2, .. }));
    }
}
