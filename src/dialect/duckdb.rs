//! DuckDB dialect
//!
//! The embedded warehouse: unbounded `VARCHAR` for text, `COPY` straight from
//! files written by the local stager.

use super::{WarehouseDialect, generic_native_type, native_base_type};
use crate::models::JsonSchema;
use crate::staging::{AccessCredentials, NULL_MARKER, StagedObject};
use crate::validation::MAX_IDENTIFIER_LENGTH;

#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDialect;

impl WarehouseDialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    // DuckDB itself is not limited, but tables must stay portable to Redshift
    fn max_identifier_length(&self) -> usize {
        MAX_IDENTIFIER_LENGTH
    }

    fn to_native_type(&self, schema: &JsonSchema) -> String {
        let generic = generic_native_type(schema);
        if native_base_type(&generic) == "text" {
            generic.replacen("TEXT", "VARCHAR", 1)
        } else {
            generic
        }
    }

    fn create_staging_table_sql(&self, temp_table: &str, target: &str) -> String {
        format!("CREATE TEMP TABLE {} AS SELECT * FROM {} LIMIT 0", temp_table, target)
    }

    fn copy_sql(
        &self,
        table: &str,
        columns: &[String],
        object: &StagedObject,
        _credentials: Option<&AccessCredentials>,
    ) -> String {
        let column_list = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "COPY {} ({}) FROM {} (FORMAT CSV, HEADER false, DELIMITER ',', QUOTE '\"', ESCAPE '\"', NULLSTR {})",
            table,
            column_list,
            self.quote_literal(&object.location),
            self.quote_literal(NULL_MARKER)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_maps_to_varchar() {
        let dialect = DuckDbDialect;
        assert_eq!(dialect.to_native_type(&JsonSchema::string().make_nullable()), "VARCHAR");
        assert_eq!(
            dialect.to_native_type(&JsonSchema::string().with_max_length(5)),
            "VARCHAR NOT NULL"
        );
        assert_eq!(dialect.to_native_type(&JsonSchema::number()), "DOUBLE PRECISION NOT NULL");
        assert_eq!(dialect.text_length(&JsonSchema::string()), None);
    }

    #[test]
    fn test_reads_back_information_schema_types() {
        let dialect = DuckDbDialect;
        for (native, expected) in [
            ("VARCHAR", JsonSchema::string()),
            ("BIGINT", JsonSchema::integer()),
            ("DOUBLE", JsonSchema::number()),
            ("BOOLEAN", JsonSchema::boolean()),
            ("TIMESTAMP WITH TIME ZONE", JsonSchema::date_time()),
        ] {
            assert_eq!(dialect.from_native_type(native, true), expected.make_nullable());
        }
    }

    #[test]
    fn test_literals_keep_backslashes() {
        assert_eq!(DuckDbDialect.quote_literal("\\N"), "'\\N'");
        assert_eq!(DuckDbDialect.quote_literal("o'clock"), "'o''clock'");
    }

    #[test]
    fn test_copy_sql() {
        let object = StagedObject {
            container: "/tmp/stage".to_string(),
            key: "cats__abc".to_string(),
            location: "/tmp/stage/cats__abc".to_string(),
        };
        let sql = DuckDbDialect.copy_sql("\"tmp\"", &["id".to_string(), "name".to_string()], &object, None);
        assert_eq!(
            sql,
            "COPY \"tmp\" (\"id\", \"name\") FROM '/tmp/stage/cats__abc' \
             (FORMAT CSV, HEADER false, DELIMITER ',', QUOTE '\"', ESCAPE '\"', NULLSTR '\\N')"
        );
    }

    #[test]
    fn test_staging_table_sql() {
        assert_eq!(
            DuckDbDialect.create_staging_table_sql("\"tmp\"", "\"main\".\"cats\""),
            "CREATE TEMP TABLE \"tmp\" AS SELECT * FROM \"main\".\"cats\" LIMIT 0"
        );
    }
}
