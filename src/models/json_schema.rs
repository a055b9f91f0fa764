//! JSON-Schema-shaped type documents
//!
//! Batches describe their columns with a trimmed-down JSON Schema: a type (or a
//! list of types), an optional `format` and an optional `maxLength`. The same
//! shape is persisted in the column mappings of [`TableSchema`](super::TableSchema)
//! so that type conflicts can be detected without asking the warehouse.
//!
//! # Example
//!
//! ```rust
//! use target_redshift::models::json_schema::{JsonSchema, JsonType};
//!
//! let schema: JsonSchema = serde_json::from_str(r#"{"type": "string", "maxLength": 32}"#).unwrap();
//! assert_eq!(schema.types, vec![JsonType::String]);
//! assert!(schema.make_nullable().is_nullable());
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Format marker for timestamp strings
pub const DATE_TIME_FORMAT: &str = "date-time";

/// Primitive JSON Schema types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Array,
}

impl std::fmt::Display for JsonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Object => "object",
            JsonType::Array => "array",
        };
        write!(f, "{}", name)
    }
}

/// Accepts `"type": "string"` as well as `"type": ["null", "string"]`
fn deserialize_types<'de, D>(deserializer: D) -> Result<Vec<JsonType>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(JsonType),
        Many(Vec<JsonType>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(t) => vec![t],
        OneOrMany::Many(types) => types,
    })
}

fn serialize_types<S>(types: &[JsonType], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match types {
        [single] => single.serialize(serializer),
        many => many.serialize(serializer),
    }
}

/// Type document for a single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Allowed types; `null` among them makes the column nullable
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_types",
        serialize_with = "serialize_types"
    )]
    pub types: Vec<JsonType>,
    /// String format hint (only `date-time` is interpreted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Declared maximum string length
    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl JsonSchema {
    /// Create a schema allowing exactly the given types
    pub fn new(types: Vec<JsonType>) -> Self {
        Self {
            types,
            format: None,
            max_length: None,
        }
    }

    pub fn string() -> Self {
        Self::new(vec![JsonType::String])
    }

    pub fn date_time() -> Self {
        Self::string().with_format(DATE_TIME_FORMAT)
    }

    pub fn integer() -> Self {
        Self::new(vec![JsonType::Integer])
    }

    pub fn number() -> Self {
        Self::new(vec![JsonType::Number])
    }

    pub fn boolean() -> Self {
        Self::new(vec![JsonType::Boolean])
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Whether `null` is an allowed type
    pub fn is_nullable(&self) -> bool {
        self.types.contains(&JsonType::Null)
    }

    /// Return a copy whose types include `null`
    pub fn make_nullable(&self) -> Self {
        let mut nullable = self.clone();
        if !nullable.is_nullable() {
            nullable.types.insert(0, JsonType::Null);
        }
        nullable
    }

    /// Allowed types other than `null`, sorted and deduplicated
    pub fn non_null_types(&self) -> Vec<JsonType> {
        let mut types: Vec<JsonType> = self
            .types
            .iter()
            .copied()
            .filter(|t| *t != JsonType::Null)
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// Whether this is a timestamp string
    pub fn is_date_time(&self) -> bool {
        self.format.as_deref() == Some(DATE_TIME_FORMAT) && self.types.contains(&JsonType::String)
    }

    /// Short type tag used as a suffix when a column has to be split
    ///
    /// `s` string, `t` date-time, `i` integer, `f` number, `b` boolean,
    /// `o` object, `a` array, `n` null.
    pub fn shorthand(&self) -> String {
        let types = self.non_null_types();
        if types.is_empty() {
            return "n".to_string();
        }

        types
            .iter()
            .map(|t| match t {
                JsonType::String if self.is_date_time() => "t",
                JsonType::String => "s",
                JsonType::Integer => "i",
                JsonType::Number => "f",
                JsonType::Boolean => "b",
                JsonType::Object => "o",
                JsonType::Array => "a",
                JsonType::Null => "n",
            })
            .collect()
    }

    /// Whether two schemas describe the same column type, ignoring nullability and length
    pub fn same_type(&self, other: &JsonSchema) -> bool {
        self.shorthand() == other.shorthand()
    }
}

/// JSON-Schema-shaped document describing every column of a batch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableJsonSchema {
    /// Column name to type document
    #[serde(default)]
    pub properties: BTreeMap<String, JsonSchema>,
}

impl TableJsonSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a property
    pub fn with_property(mut self, name: impl Into<String>, schema: JsonSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&JsonSchema> {
        self.properties.get(name)
    }

    /// Deep copy with every top-level property widened to include `null`
    ///
    /// The warehouse cannot add a NOT NULL column without a default, so every
    /// column the loader creates is nullable regardless of the source schema.
    pub fn force_nullable(&self) -> Self {
        Self {
            properties: self
                .properties
                .iter()
                .map(|(name, schema)| (name.clone(), schema.make_nullable()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_single_and_list_types() {
        let single: JsonSchema = serde_json::from_str(r#"{"type": "integer"}"#).unwrap();
        assert_eq!(single.types, vec![JsonType::Integer]);

        let many: JsonSchema = serde_json::from_str(r#"{"type": ["null", "string"]}"#).unwrap();
        assert_eq!(many.types, vec![JsonType::Null, JsonType::String]);
        assert!(many.is_nullable());
    }

    #[test]
    fn test_serialize_keeps_json_schema_shape() {
        let schema = JsonSchema::string().with_max_length(10);
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json, serde_json::json!({"type": "string", "maxLength": 10}));

        let nullable = serde_json::to_value(schema.make_nullable()).unwrap();
        assert_eq!(nullable["type"], serde_json::json!(["null", "string"]));
    }

    #[test]
    fn test_make_nullable_is_idempotent() {
        let schema = JsonSchema::integer().make_nullable().make_nullable();
        assert_eq!(schema.types, vec![JsonType::Null, JsonType::Integer]);
    }

    #[test]
    fn test_shorthand() {
        assert_eq!(JsonSchema::string().shorthand(), "s");
        assert_eq!(JsonSchema::date_time().shorthand(), "t");
        assert_eq!(JsonSchema::integer().make_nullable().shorthand(), "i");
        assert_eq!(JsonSchema::number().shorthand(), "f");
        assert_eq!(JsonSchema::boolean().shorthand(), "b");
        assert_eq!(JsonSchema::new(vec![JsonType::Null]).shorthand(), "n");
    }

    #[test]
    fn test_same_type_ignores_nullability_and_length() {
        let a = JsonSchema::string().with_max_length(5);
        let b = JsonSchema::string().make_nullable();
        assert!(a.same_type(&b));
        assert!(!a.same_type(&JsonSchema::date_time()));
        assert!(!JsonSchema::integer().same_type(&JsonSchema::number()));
    }

    #[test]
    fn test_force_nullable_leaves_original_untouched() {
        let original = TableJsonSchema::new()
            .with_property("id", JsonSchema::integer())
            .with_property("name", JsonSchema::string());

        let nullable = original.force_nullable();

        assert!(nullable.properties.values().all(JsonSchema::is_nullable));
        assert!(!original.get("id").unwrap().is_nullable());
        assert!(!original.get("name").unwrap().is_nullable());
    }
}
