//! Physical column model

use serde::{Deserialize, Serialize};

/// A physical column as the loader creates it
///
/// Columns added by the loader are always nullable: the warehouse cannot add a
/// NOT NULL column to a populated table without a default.
///
/// # Example
///
/// ```rust
/// use target_redshift::models::Column;
///
/// let column = Column::new("name__s", "varchar(256)").with_max_length(Some(256));
/// assert!(column.nullable);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    /// Physical column name
    pub name: String,
    /// Whether the column allows NULL values (default: true)
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Native type (e.g. "BIGINT", "varchar(256)")
    pub sql_type: String,
    /// Character length, already capped at the dialect maximum
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            sql_type: sql_type.into(),
            max_length: None,
        }
    }

    pub fn with_max_length(mut self, max_length: Option<usize>) -> Self {
        self.max_length = max_length;
        self
    }

    /// Column definition fragment for CREATE/ALTER statements
    pub fn definition(&self, quoted_name: &str) -> String {
        format!("{} {}", quoted_name, self.sql_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_column_is_nullable() {
        let column = Column::new("id", "BIGINT");
        assert!(column.nullable);
        assert_eq!(column.max_length, None);
        assert_eq!(column.definition("\"id\""), "\"id\" BIGINT");
    }

    #[test]
    fn test_deserialize_defaults_nullable() {
        let column: Column = serde_json::from_str(r#"{"name": "x", "sql_type": "BOOLEAN"}"#).unwrap();
        assert!(column.nullable);
    }
}
