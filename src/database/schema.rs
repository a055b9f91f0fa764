//! Metadata table definitions
//!
//! The loader keeps one JSON document per physical table in a reserved table
//! inside the target schema. The warehouse enforces no primary keys, so a
//! document is replaced by deleting and re-inserting its row.
//!
//! The SQL is compatible with both DuckDB and Redshift.

use crate::dialect::WarehouseDialect;

/// Reserved metadata table name
pub const METADATA_TABLE: &str = "_sdc_table_metadata";

/// Width of the `table_name` column (the identifier limit)
pub const METADATA_NAME_LENGTH: usize = 127;

/// Width of the `metadata` column (the VARCHAR limit)
pub const METADATA_DOCUMENT_LENGTH: usize = 65535;

/// Statements on the metadata table of one target schema
pub struct MetadataSchema<'a> {
    dialect: &'a dyn WarehouseDialect,
    schema: &'a str,
}

impl<'a> MetadataSchema<'a> {
    pub fn new(dialect: &'a dyn WarehouseDialect, schema: &'a str) -> Self {
        Self { dialect, schema }
    }

    /// Qualified, quoted name of the metadata table
    pub fn table(&self) -> String {
        self.dialect.qualified_name(self.schema, METADATA_TABLE)
    }

    pub fn create_schema_sql(&self) -> String {
        format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.dialect.quote_identifier(self.schema)
        )
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (table_name VARCHAR({}), metadata VARCHAR({}))",
            self.table(),
            METADATA_NAME_LENGTH,
            METADATA_DOCUMENT_LENGTH
        )
    }

    pub fn select_sql(&self, table_name: &str) -> String {
        format!(
            "SELECT metadata FROM {} WHERE table_name = {}",
            self.table(),
            self.dialect.quote_literal(table_name)
        )
    }

    pub fn delete_sql(&self, table_name: &str) -> String {
        format!(
            "DELETE FROM {} WHERE table_name = {}",
            self.table(),
            self.dialect.quote_literal(table_name)
        )
    }

    pub fn insert_sql(&self, table_name: &str, document: &str) -> String {
        format!(
            "INSERT INTO {} (table_name, metadata) VALUES ({}, {})",
            self.table(),
            self.dialect.quote_literal(table_name),
            self.dialect.quote_literal(document)
        )
    }

    /// Whether a physical table exists in the target schema
    pub fn table_exists_sql(&self, table_name: &str) -> String {
        format!(
            "SELECT COUNT(*) AS count FROM information_schema.tables \
             WHERE table_schema = {} AND table_name = {}",
            self.dialect.quote_literal(self.schema),
            self.dialect.quote_literal(table_name)
        )
    }

    /// Columns of a physical table, as reported by the warehouse
    pub fn describe_columns_sql(&self, table_name: &str) -> String {
        format!(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
            self.dialect.quote_literal(self.schema),
            self.dialect.quote_literal(table_name)
        )
    }
}
