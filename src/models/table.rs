//! Table metadata model
//!
//! A [`TableSchema`] is the loader's own record of a physical table: its
//! declared version, its key properties and, for every physical column, which
//! source property it holds and with which abstract type. It is persisted as a
//! JSON document in the reserved metadata table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::json_schema::JsonSchema;

/// Placeholder column created with every new table (zero-column tables are not allowed)
pub const CREATE_TABLE_PLACEHOLDER_COLUMN: &str = "_sdc_create_table_placeholder";

/// Current layout of the persisted metadata document
pub const METADATA_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    METADATA_SCHEMA_VERSION
}

fn same_property(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Physical column mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Native column type as created (e.g. "varchar(256)")
    pub sql_type: String,
    /// Abstract type of the values stored in the column
    pub json_schema: JsonSchema,
    /// Source property the column was created for
    pub from: String,
}

impl ColumnMapping {
    pub fn new(sql_type: impl Into<String>, json_schema: JsonSchema, from: impl Into<String>) -> Self {
        Self {
            sql_type: sql_type.into(),
            json_schema,
            from: from.into(),
        }
    }
}

/// Loader metadata for one physical table
///
/// # Example
///
/// ```rust
/// use target_redshift::models::{ColumnMapping, JsonSchema, TableSchema};
///
/// let mut table = TableSchema::new("cats").with_key_properties(vec!["id".to_string()]);
/// table.add_mapping("id", ColumnMapping::new("BIGINT", JsonSchema::integer(), "id"));
///
/// assert_eq!(table.column_for("id", &JsonSchema::integer().make_nullable()), Some("id"));
/// assert_eq!(table.column_for("id", &JsonSchema::string()), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Physical table name
    pub name: String,
    /// Declared table version (full-table replication)
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub key_properties: Vec<String>,
    /// Physical column name to mapping
    #[serde(default)]
    pub mappings: BTreeMap<String, ColumnMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            schema_version: METADATA_SCHEMA_VERSION,
            key_properties: Vec::new(),
            mappings: BTreeMap::new(),
            updated_at: None,
        }
    }

    pub fn with_version(mut self, version: Option<i64>) -> Self {
        self.version = version;
        self
    }

    pub fn with_key_properties(mut self, key_properties: Vec<String>) -> Self {
        self.key_properties = key_properties;
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.mappings.contains_key(column)
    }

    pub fn add_mapping(&mut self, column: impl Into<String>, mapping: ColumnMapping) {
        self.mappings.insert(column.into(), mapping);
    }

    /// Physical columns holding values of the given source property
    ///
    /// Property names are matched case-insensitively, as the warehouse folds
    /// identifiers to lower case.
    pub fn columns_from<'a, 'b>(
        &'a self,
        property: &'b str,
    ) -> impl Iterator<Item = (&'a str, &'a ColumnMapping)> + use<'a, 'b> {
        self.mappings
            .iter()
            .filter(move |(_, mapping)| same_property(&mapping.from, property))
            .map(|(column, mapping)| (column.as_str(), mapping))
    }

    /// Physical column already holding `property` with a compatible type
    pub fn column_for(&self, property: &str, schema: &JsonSchema) -> Option<&str> {
        self.columns_from(property)
            .find(|(_, mapping)| mapping.json_schema.same_type(schema))
            .map(|(column, _)| column)
    }

    /// Move a mapping to a new physical column name
    ///
    /// Returns false when `from` is not mapped.
    pub fn rename_mapping(&mut self, from: &str, to: impl Into<String>) -> bool {
        match self.mappings.remove(from) {
            Some(mapping) => {
                self.mappings.insert(to.into(), mapping);
                true
            }
            None => false,
        }
    }

    /// Sorted physical column names, placeholder excluded
    pub fn data_columns(&self) -> Vec<&str> {
        self.mappings
            .keys()
            .map(String::as_str)
            .filter(|column| *column != CREATE_TABLE_PLACEHOLDER_COLUMN)
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats() -> TableSchema {
        let mut table = TableSchema::new("cats")
            .with_version(Some(1))
            .with_key_properties(vec!["id".to_string()]);
        table.add_mapping(
            CREATE_TABLE_PLACEHOLDER_COLUMN,
            ColumnMapping::new("BOOLEAN", JsonSchema::boolean().make_nullable(), CREATE_TABLE_PLACEHOLDER_COLUMN),
        );
        table.add_mapping("id", ColumnMapping::new("BIGINT", JsonSchema::integer(), "id"));
        table.add_mapping("name__s", ColumnMapping::new("varchar(256)", JsonSchema::string(), "name"));
        table.add_mapping("name__b", ColumnMapping::new("BOOLEAN", JsonSchema::boolean(), "name"));
        table
    }

    #[test]
    fn test_column_for_matches_on_type() {
        let table = cats();
        assert_eq!(table.column_for("name", &JsonSchema::boolean()), Some("name__b"));
        assert_eq!(table.column_for("name", &JsonSchema::string().make_nullable()), Some("name__s"));
        assert_eq!(table.column_for("name", &JsonSchema::integer()), None);
        assert_eq!(table.column_for("age", &JsonSchema::integer()), None);
    }

    #[test]
    fn test_property_lookup_ignores_case() {
        let table = cats();
        assert_eq!(table.column_for("ID", &JsonSchema::integer()), Some("id"));
        assert_eq!(table.columns_from("Name").count(), 2);
        assert_eq!(table.column_for("ID", &JsonSchema::string()), None);
    }

    #[test]
    fn test_column_for_outlives_property_name() {
        let table = cats();
        let column = {
            let property = String::from("name");
            table.column_for(&property, &JsonSchema::boolean())
        };
        assert_eq!(column, Some("name__b"));
    }

    #[test]
    fn test_rename_mapping() {
        let mut table = cats();
        assert!(table.rename_mapping("id", "id__i"));
        assert!(!table.has_column("id"));
        assert_eq!(table.mappings["id__i"].from, "id");
        assert!(!table.rename_mapping("missing", "x"));
    }

    #[test]
    fn test_data_columns_excludes_placeholder() {
        assert_eq!(cats().data_columns(), vec!["id", "name__b", "name__s"]);
    }

    #[test]
    fn test_json_round_trip_defaults() {
        let table = cats();
        let parsed = TableSchema::from_json(&table.to_json().unwrap()).unwrap();
        assert_eq!(parsed, table);

        let minimal = TableSchema::from_json(r#"{"name": "dogs"}"#).unwrap();
        assert_eq!(minimal.version, None);
        assert_eq!(minimal.schema_version, METADATA_SCHEMA_VERSION);
        assert!(minimal.mappings.is_empty());
    }
}
