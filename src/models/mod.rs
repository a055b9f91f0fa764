//! Models module
//!
//! Data structures shared by the loader: incoming batches and their schema
//! documents, the persisted per-table metadata, and physical columns.

pub mod batch;
pub mod column;
pub mod json_schema;
pub mod table;

pub use batch::{Row, SEQUENCE_COLUMN, StreamBatch, is_subkey};
pub use column::Column;
pub use json_schema::{DATE_TIME_FORMAT, JsonSchema, JsonType, TableJsonSchema};
pub use table::{CREATE_TABLE_PLACEHOLDER_COLUMN, ColumnMapping, METADATA_SCHEMA_VERSION, TableSchema};
