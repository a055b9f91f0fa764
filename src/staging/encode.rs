//! Delimited encoding of staged rows
//!
//! Rows are written as headerless CSV in a fixed column order. SQL NULL (and a
//! missing column) is written as the [`NULL_MARKER`], so an empty string and a
//! NULL stay distinguishable after the bulk load.

use csv::{QuoteStyle, WriterBuilder};
use serde_json::Value;

use super::{StagingError, StagingResult};
use crate::models::Row;

/// Text written in place of SQL NULL
pub const NULL_MARKER: &str = "\\N";

fn encode_value(value: Option<&Value>) -> StagingResult<String> {
    Ok(match value {
        None | Some(Value::Null) => NULL_MARKER.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => serde_json::to_string(nested)
            .map_err(|e| StagingError::EncodingFailed(e.to_string()))?,
    })
}

/// Encode rows as CSV, one record per row, columns in the given order
///
/// # Example
///
/// ```rust
/// use target_redshift::staging::encode_rows;
/// use serde_json::json;
///
/// let row = json!({"id": 1, "name": null}).as_object().unwrap().clone();
/// let body = encode_rows(&["id".to_string(), "name".to_string()], &[row]).unwrap();
/// assert_eq!(String::from_utf8(body).unwrap(), "1,\\N\n");
/// ```
pub fn encode_rows(columns: &[String], rows: &[Row]) -> StagingResult<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    for row in rows {
        let record = columns
            .iter()
            .map(|column| encode_value(row.get(column)))
            .collect::<StagingResult<Vec<String>>>()?;
        writer
            .write_record(&record)
            .map_err(|e| StagingError::EncodingFailed(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| StagingError::EncodingFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn encode(names: &[&str], rows: &[Row]) -> String {
        String::from_utf8(encode_rows(&columns(names), rows).unwrap()).unwrap()
    }

    #[test]
    fn test_column_order_and_missing_values() {
        let rows = vec![row(json!({"b": 2, "a": 1})), row(json!({"a": 3}))];
        assert_eq!(encode(&["a", "b"], &rows), "1,2\n3,\\N\n");
    }

    #[test]
    fn test_null_and_empty_string_differ() {
        let rows = vec![row(json!({"a": null, "b": "", "c": "x"}))];
        let encoded = encode(&["a", "b", "c"], &rows);
        assert_eq!(encoded, "\\N,,x\n");
    }

    #[test]
    fn test_quotes_when_needed() {
        let rows = vec![row(json!({"a": "hello, world", "b": "say \"hi\"", "c": "line\nbreak"}))];
        assert_eq!(
            encode(&["a", "b", "c"], &rows),
            "\"hello, world\",\"say \"\"hi\"\"\",\"line\nbreak\"\n"
        );
    }

    #[test]
    fn test_scalars() {
        let rows = vec![row(json!({"t": true, "f": false, "i": -7, "x": 1.5}))];
        assert_eq!(encode(&["t", "f", "i", "x"], &rows), "true,false,-7,1.5\n");
    }

    #[test]
    fn test_nested_values_are_json_text() {
        let rows = vec![row(json!({"o": {"k": 1}}))];
        assert_eq!(encode(&["o"], &rows), "\"{\"\"k\"\":1}\"\n");
    }

    #[test]
    fn test_no_rows() {
        assert!(encode_rows(&columns(&["a"]), &[]).unwrap().is_empty());
    }
}
