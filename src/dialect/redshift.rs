//! Redshift dialect

use tracing::warn;

use super::{WarehouseDialect, generic_json_schema, generic_native_type, native_base_type};
use crate::models::JsonSchema;
use crate::staging::{AccessCredentials, StagedObject};
use crate::validation::MAX_IDENTIFIER_LENGTH;

/// Maximum VARCHAR length Redshift accepts
pub const REDSHIFT_MAX_VARCHAR: usize = 65535;

/// Redshift: `varchar(n)` for text, `COPY ... CREDENTIALS` from S3
#[derive(Debug, Clone)]
pub struct RedshiftDialect {
    default_column_length: usize,
}

impl Default for RedshiftDialect {
    fn default() -> Self {
        Self::new(REDSHIFT_MAX_VARCHAR)
    }
}

impl RedshiftDialect {
    /// `default_column_length` is used for text columns without a declared `maxLength`
    pub fn new(default_column_length: usize) -> Self {
        Self {
            default_column_length,
        }
    }

    fn is_text(schema: &JsonSchema) -> bool {
        native_base_type(&generic_native_type(schema)) == "text"
    }
}

impl WarehouseDialect for RedshiftDialect {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn max_identifier_length(&self) -> usize {
        MAX_IDENTIFIER_LENGTH
    }

    fn text_length(&self, schema: &JsonSchema) -> Option<usize> {
        if !Self::is_text(schema) {
            return None;
        }

        let declared = schema.max_length.unwrap_or(self.default_column_length);
        Some(declared.min(REDSHIFT_MAX_VARCHAR))
    }

    fn to_native_type(&self, schema: &JsonSchema) -> String {
        if let Some(declared) = schema.max_length
            && declared > REDSHIFT_MAX_VARCHAR
            && Self::is_text(schema)
        {
            warn!(
                "Declared length {} exceeds the Redshift maximum, capping at {}",
                declared, REDSHIFT_MAX_VARCHAR
            );
        }

        let generic = generic_native_type(schema);
        match (generic.as_str(), self.text_length(schema)) {
            ("TEXT", Some(length)) => format!("varchar({})", length),
            ("TEXT NOT NULL", Some(length)) => format!("varchar({}) NOT NULL", length),
            _ => generic,
        }
    }

    fn from_native_type(&self, native: &str, is_nullable: bool) -> JsonSchema {
        if native.eq_ignore_ascii_case("character varying") {
            let schema = JsonSchema::string();
            return if is_nullable {
                schema.make_nullable()
            } else {
                schema
            };
        }
        generic_json_schema(native, is_nullable)
    }

    /// Single quotes and backslashes are both doubled
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn create_staging_table_sql(&self, temp_table: &str, target: &str) -> String {
        format!("CREATE TEMP TABLE {} (LIKE {})", temp_table, target)
    }

    fn copy_sql(
        &self,
        table: &str,
        columns: &[String],
        object: &StagedObject,
        credentials: Option<&AccessCredentials>,
    ) -> String {
        let column_list = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        // Without static credentials the cluster's default IAM role reads the bucket
        let authorization = match credentials {
            Some(credentials) => format!(
                "CREDENTIALS {}",
                self.quote_literal(&credentials.to_copy_credentials())
            ),
            None => "IAM_ROLE default".to_string(),
        };

        format!(
            "COPY {} ({}) FROM {} {} FORMAT AS CSV NULL AS {}",
            table,
            column_list,
            self.quote_literal(&object.location),
            authorization,
            self.quote_literal(crate::staging::NULL_MARKER)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> StagedObject {
        StagedObject {
            container: "bucket".to_string(),
            key: "cats__abc".to_string(),
            location: "s3://bucket/cats__abc".to_string(),
        }
    }

    #[test]
    fn test_text_maps_to_bounded_varchar() {
        let dialect = RedshiftDialect::default();
        assert_eq!(
            dialect.to_native_type(&JsonSchema::string().make_nullable()),
            "varchar(65535)"
        );
        assert_eq!(
            dialect.to_native_type(&JsonSchema::string().with_max_length(10)),
            "varchar(10) NOT NULL"
        );
        assert_eq!(
            dialect.to_native_type(&JsonSchema::string().with_max_length(100_000).make_nullable()),
            "varchar(65535)"
        );
    }

    #[test]
    fn test_configured_default_length() {
        let dialect = RedshiftDialect::new(256);
        assert_eq!(
            dialect.to_native_type(&JsonSchema::string().make_nullable()),
            "varchar(256)"
        );
        assert_eq!(dialect.text_length(&JsonSchema::integer()), None);
    }

    #[test]
    fn test_non_text_types_use_generic_mapping() {
        let dialect = RedshiftDialect::default();
        assert_eq!(dialect.to_native_type(&JsonSchema::integer()), "BIGINT NOT NULL");
        assert_eq!(
            dialect.to_native_type(&JsonSchema::date_time().make_nullable()),
            "TIMESTAMP WITH TIME ZONE"
        );
        assert_eq!(
            dialect.to_native_type(&JsonSchema::boolean().make_nullable()),
            "BOOLEAN"
        );
    }

    #[test]
    fn test_character_varying_maps_to_string() {
        let dialect = RedshiftDialect::default();
        assert_eq!(
            dialect.from_native_type("character varying", true),
            JsonSchema::string().make_nullable()
        );
        assert_eq!(
            dialect.from_native_type("character varying", false),
            JsonSchema::string()
        );
        assert_eq!(dialect.from_native_type("bigint", true), JsonSchema::integer().make_nullable());
    }

    #[test]
    fn test_column_is_nullable_with_capped_length() {
        let dialect = RedshiftDialect::default();
        let column = dialect.column("name", &JsonSchema::string().with_max_length(70_000));
        assert!(column.nullable);
        assert_eq!(column.sql_type, "varchar(65535)");
        assert_eq!(column.max_length, Some(REDSHIFT_MAX_VARCHAR));
    }

    #[test]
    fn test_quote_literal_doubles_backslashes() {
        let dialect = RedshiftDialect::default();
        assert_eq!(dialect.quote_literal("it's"), "'it''s'");
        assert_eq!(dialect.quote_literal("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_copy_sql_with_credentials() {
        let dialect = RedshiftDialect::default();
        let credentials = AccessCredentials::new("AKID", "SECRET");
        let sql = dialect.copy_sql(
            "\"tmp_cats\"",
            &["id".to_string(), "name".to_string()],
            &object(),
            Some(&credentials),
        );
        assert_eq!(
            sql,
            "COPY \"tmp_cats\" (\"id\", \"name\") FROM 's3://bucket/cats__abc' \
             CREDENTIALS 'aws_access_key_id=AKID;aws_secret_access_key=SECRET' \
             FORMAT AS CSV NULL AS '\\\\N'"
        );
    }

    #[test]
    fn test_copy_sql_without_credentials_uses_iam_role() {
        let dialect = RedshiftDialect::default();
        let sql = dialect.copy_sql("\"t\"", &["id".to_string()], &object(), None);
        assert!(sql.contains("IAM_ROLE default"));
        assert!(!sql.contains("CREDENTIALS"));
    }

    #[test]
    fn test_staging_table_sql() {
        let dialect = RedshiftDialect::default();
        assert_eq!(
            dialect.create_staging_table_sql("\"tmp\"", "\"public\".\"cats\""),
            "CREATE TEMP TABLE \"tmp\" (LIKE \"public\".\"cats\")"
        );
    }
}
