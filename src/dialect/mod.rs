//! Warehouse dialects
//!
//! A dialect is a strategy object the loader is composed with. It owns every
//! piece of warehouse-specific syntax: type mapping in both directions,
//! identifier rules and quoting, literal escaping, the staging table and the
//! bulk-load statement.
//!
//! The default methods implement the generic column-store mapping; concrete
//! dialects override only what differs.

mod duckdb;
mod redshift;

pub use self::duckdb::DuckDbDialect;
pub use self::redshift::{REDSHIFT_MAX_VARCHAR, RedshiftDialect};

use crate::models::{Column, JsonSchema, JsonType, TableJsonSchema};
use crate::staging::{AccessCredentials, StagedObject};
use crate::validation::{self, IdentifierPolicy, ValidationResult};

/// Generic native type for an abstract type, `NOT NULL` suffix included
///
/// `string`+`date-time` maps to `TIMESTAMP WITH TIME ZONE`, `integer` to
/// `BIGINT`, `number` to `DOUBLE PRECISION`, `boolean` to `BOOLEAN` and
/// everything else to `TEXT`.
pub fn generic_native_type(schema: &JsonSchema) -> String {
    let base = match schema.non_null_types().as_slice() {
        [JsonType::String] if schema.is_date_time() => "TIMESTAMP WITH TIME ZONE",
        [JsonType::Integer] => "BIGINT",
        [JsonType::Number] => "DOUBLE PRECISION",
        [JsonType::Boolean] => "BOOLEAN",
        _ => "TEXT",
    };

    if schema.is_nullable() {
        base.to_string()
    } else {
        format!("{} NOT NULL", base)
    }
}

/// Inverse of [`generic_native_type`] for types reported by `information_schema`
pub fn generic_json_schema(native: &str, is_nullable: bool) -> JsonSchema {
    let schema = match native_base_type(native).as_str() {
        "timestamp with time zone" | "timestamptz" => JsonSchema::date_time(),
        "bigint" | "integer" | "int" | "int2" | "int4" | "int8" | "smallint" | "hugeint" => {
            JsonSchema::integer()
        }
        "double precision" | "double" | "real" | "float" | "float4" | "float8" | "numeric"
        | "decimal" => JsonSchema::number(),
        "boolean" | "bool" => JsonSchema::boolean(),
        _ => JsonSchema::string(),
    };

    if is_nullable {
        schema.make_nullable()
    } else {
        schema
    }
}

/// Native type with length and nullability stripped, lower-cased
///
/// `varchar(256) NOT NULL` and `VARCHAR` both become `varchar`.
pub fn native_base_type(native: &str) -> String {
    let lower = native.trim().to_lowercase();
    let without_null = lower.strip_suffix("not null").unwrap_or(&lower).trim_end();
    let base = match without_null.find('(') {
        Some(index) => &without_null[..index],
        None => without_null,
    };
    base.trim().to_string()
}

/// Warehouse-specific syntax and limits
pub trait WarehouseDialect: Send + Sync {
    /// Dialect name ("redshift" or "duckdb")
    fn name(&self) -> &'static str;

    /// Maximum identifier length in bytes
    fn max_identifier_length(&self) -> usize;

    /// Map an abstract type to the native column type
    fn to_native_type(&self, schema: &JsonSchema) -> String {
        generic_native_type(schema)
    }

    /// Map a native column type back to an abstract type
    fn from_native_type(&self, native: &str, is_nullable: bool) -> JsonSchema {
        generic_json_schema(native, is_nullable)
    }

    /// Copy of `schema` with every property widened to include null
    fn force_nullable(&self, schema: &TableJsonSchema) -> TableJsonSchema {
        schema.force_nullable()
    }

    /// Character length a text column of this schema gets, if bounded
    fn text_length(&self, _schema: &JsonSchema) -> Option<usize> {
        None
    }

    /// Native column definition for a new (always nullable) column
    fn column(&self, name: &str, schema: &JsonSchema) -> Column {
        let nullable = schema.make_nullable();
        Column::new(name, self.to_native_type(&nullable)).with_max_length(self.text_length(&nullable))
    }

    /// Lower-case and validate an identifier under `policy`
    fn canonicalize_identifier(
        &self,
        name: &str,
        field: &'static str,
        policy: &IdentifierPolicy,
    ) -> ValidationResult<String> {
        validation::canonicalize_identifier(name, field, policy)
    }

    fn quote_identifier(&self, name: &str) -> String {
        validation::quote_identifier(name)
    }

    /// `"schema"."table"`
    fn qualified_name(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_identifier(schema), self.quote_identifier(table))
    }

    /// Quote a string literal, doubling single quotes
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Create a temporary table with the destination's columns and no rows
    fn create_staging_table_sql(&self, temp_table: &str, target: &str) -> String;

    /// Bulk-load a staged object into `table`, columns in the given order
    fn copy_sql(
        &self,
        table: &str,
        columns: &[String],
        object: &StagedObject,
        credentials: Option<&AccessCredentials>,
    ) -> String;
}
