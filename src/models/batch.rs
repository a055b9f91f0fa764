//! Stream batches
//!
//! A [`StreamBatch`] is the unit of work of the loader: a bounded set of flat,
//! already-denormalized rows destined for one logical table, together with the
//! schema document describing them, the stream's key properties and, for
//! full-table replication streams, the table version.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::json_schema::{JsonSchema, TableJsonSchema};
use crate::validation::{ValidationError, ValidationResult};

/// Column carrying the per-record ordering token
pub const SEQUENCE_COLUMN: &str = "_sdc_sequence";

/// Synthetic nesting ordinals added by the denormalizer (`_sdc_level_0_id`, ...)
static SUBKEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_sdc_level_[0-9]+_id$").expect("valid subkey regex"));

/// A single flat row: column name to scalar JSON value
pub type Row = serde_json::Map<String, Value>;

/// Whether a column name is a synthetic nesting ordinal
pub fn is_subkey(name: &str) -> bool {
    SUBKEY_PATTERN.is_match(name)
}

/// A batch of rows for one logical table
///
/// Batches are values: every normalisation the loader applies returns a new
/// batch and leaves the caller's copy untouched.
///
/// # Example
///
/// ```rust
/// use target_redshift::models::{JsonSchema, StreamBatch, TableJsonSchema};
/// use serde_json::json;
///
/// let schema = TableJsonSchema::new()
///     .with_property("id", JsonSchema::integer())
///     .with_property("name", JsonSchema::string());
///
/// let batch = StreamBatch::new("cats", schema, vec!["id".to_string()])
///     .with_rows(vec![json!({"id": 1, "name": "Tom"}).as_object().unwrap().clone()]);
///
/// assert_eq!(batch.len(), 1);
/// assert!(batch.validate_keys().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamBatch {
    /// Stream (logical table) name
    pub stream: String,
    /// Ordered rows
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Schema document covering every column of the rows
    #[serde(default)]
    pub schema: TableJsonSchema,
    /// Names of the columns forming the logical primary key
    #[serde(default)]
    pub key_properties: Vec<String>,
    /// Table version (full-table replication only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Highest sequence number observed while the batch was assembled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sequence: Option<i64>,
}

impl StreamBatch {
    pub fn new(stream: impl Into<String>, schema: TableJsonSchema, key_properties: Vec<String>) -> Self {
        Self {
            stream: stream.into(),
            rows: Vec::new(),
            schema,
            key_properties,
            version: None,
            max_sequence: None,
        }
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_max_sequence(mut self, max_sequence: i64) -> Self {
        self.max_sequence = Some(max_sequence);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Schema columns that are nesting ordinals, in name order
    pub fn subkeys(&self) -> Vec<String> {
        self.schema
            .properties
            .keys()
            .filter(|name| is_subkey(name))
            .cloned()
            .collect()
    }

    /// Return a copy in which every row carries `_sdc_sequence`
    ///
    /// The column is added to the schema as a nullable integer if absent. Rows
    /// without a sequence inherit the batch's `max_sequence`, or the current
    /// time in milliseconds when the batch has none.
    pub fn with_sequence(&self) -> Self {
        let mut batch = self.clone();

        batch
            .schema
            .properties
            .entry(SEQUENCE_COLUMN.to_string())
            .or_insert_with(|| JsonSchema::integer().make_nullable());

        let fallback = self
            .max_sequence
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        for row in &mut batch.rows {
            let missing = row.get(SEQUENCE_COLUMN).is_none_or(Value::is_null);
            if missing {
                row.insert(SEQUENCE_COLUMN.to_string(), Value::from(fallback));
            }
        }

        batch
    }

    /// Check that every row carries a non-null value for each key property
    pub fn validate_keys(&self) -> ValidationResult<()> {
        for (index, row) in self.rows.iter().enumerate() {
            for key in &self.key_properties {
                if row.get(key).is_none_or(Value::is_null) {
                    return Err(ValidationError::MissingKeyValue {
                        stream: self.stream.clone(),
                        key: key.clone(),
                        row: index,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn cats() -> StreamBatch {
        let schema = TableJsonSchema::new()
            .with_property("id", JsonSchema::integer())
            .with_property("name", JsonSchema::string());
        StreamBatch::new("cats", schema, vec!["id".to_string()])
    }

    #[test]
    fn test_is_subkey() {
        assert!(is_subkey("_sdc_level_0_id"));
        assert!(is_subkey("_sdc_level_12_id"));
        assert!(!is_subkey("_sdc_level_id"));
        assert!(!is_subkey("_sdc_sequence"));
        assert!(!is_subkey("x_sdc_level_0_id"));
    }

    #[test]
    fn test_subkeys_from_schema() {
        let mut batch = cats();
        batch
            .schema
            .properties
            .insert("_sdc_level_1_id".to_string(), JsonSchema::integer());
        batch
            .schema
            .properties
            .insert("_sdc_level_0_id".to_string(), JsonSchema::integer());

        assert_eq!(batch.subkeys(), vec!["_sdc_level_0_id", "_sdc_level_1_id"]);
    }

    #[test]
    fn test_with_sequence_fills_missing_values() {
        let batch = cats()
            .with_rows(vec![
                row(json!({"id": 1, "name": "a"})),
                row(json!({"id": 2, "name": "b", "_sdc_sequence": 7})),
                row(json!({"id": 3, "name": "c", "_sdc_sequence": null})),
            ])
            .with_max_sequence(42);

        let sequenced = batch.with_sequence();

        assert_eq!(sequenced.rows[0][SEQUENCE_COLUMN], json!(42));
        assert_eq!(sequenced.rows[1][SEQUENCE_COLUMN], json!(7));
        assert_eq!(sequenced.rows[2][SEQUENCE_COLUMN], json!(42));
        assert!(sequenced.schema.get(SEQUENCE_COLUMN).unwrap().is_nullable());

        // the caller's batch is untouched
        assert!(!batch.rows[0].contains_key(SEQUENCE_COLUMN));
        assert!(batch.schema.get(SEQUENCE_COLUMN).is_none());
    }

    #[test]
    fn test_with_sequence_without_max_uses_clock() {
        let before = Utc::now().timestamp_millis();
        let sequenced = cats()
            .with_rows(vec![row(json!({"id": 1, "name": "a"}))])
            .with_sequence();

        let seq = sequenced.rows[0][SEQUENCE_COLUMN].as_i64().unwrap();
        assert!(seq >= before);
    }

    #[test]
    fn test_validate_keys_rejects_missing_and_null() {
        let missing = cats().with_rows(vec![row(json!({"name": "a"}))]);
        assert!(matches!(
            missing.validate_keys(),
            Err(ValidationError::MissingKeyValue { row: 0, .. })
        ));

        let null = cats().with_rows(vec![
            row(json!({"id": 1, "name": "a"})),
            row(json!({"id": null, "name": "b"})),
        ]);
        assert!(matches!(
            null.validate_keys(),
            Err(ValidationError::MissingKeyValue { row: 1, .. })
        ));
    }

    #[test]
    fn test_deserialize_json_line() {
        let line = r#"{
            "stream": "cats",
            "rows": [{"id": 1, "name": "Tom"}],
            "schema": {"properties": {"id": {"type": "integer"}, "name": {"type": ["null", "string"]}}},
            "key_properties": ["id"],
            "version": 3
        }"#;

        let batch: StreamBatch = serde_json::from_str(line).unwrap();
        assert_eq!(batch.stream, "cats");
        assert_eq!(batch.version, Some(3));
        assert_eq!(batch.max_sequence, None);
        assert!(batch.schema.get("name").unwrap().is_nullable());
    }
}
