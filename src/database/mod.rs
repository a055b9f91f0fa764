//! Warehouse connections
//!
//! This module provides the connection abstraction the loader drives:
//! - DuckDB: embedded warehouse, used locally and by the test-suite
//! - PostgreSQL wire protocol: Redshift clusters (and Postgres for development)
//!
//! A connection executes statements one at a time and exposes explicit
//! transaction control, so that every DDL and DML statement of a batch runs in
//! one warehouse transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Re-export implementations based on features
#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod config;
pub mod schema;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBBackend;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

pub use config::{BackendType, LoaderConfig, StagerType};
pub use schema::{METADATA_TABLE, MetadataSchema};

/// Error type for warehouse operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to the warehouse
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Transaction control failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for warehouse operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Query result row as a JSON value
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
    /// Number of rows affected (for INSERT/UPDATE/DELETE)
    pub rows_affected: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: None,
            execution_time_ms: 0,
        }
    }

    /// Create an empty result
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// String value of `column` in the first row
    pub fn first_string(&self, column: &str) -> Option<&str> {
        self.rows.first()?.get(column)?.as_str()
    }

    /// Integer value of `column` in the first row
    ///
    /// Counts come back as strings from some backends; those are parsed too.
    pub fn first_i64(&self, column: &str) -> Option<i64> {
        match self.rows.first()?.get(column)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Connection to the warehouse
///
/// This trait defines the interface for warehouse backends (DuckDB, PostgreSQL wire).
/// All operations are async; implementations serialise statements internally.
#[async_trait(?Send)]
pub trait WarehouseConnection: Send + Sync {
    /// Execute a statement that returns no rows
    ///
    /// # Arguments
    /// * `sql` - SQL statement to execute
    ///
    /// # Returns
    /// Number of rows affected, where the backend reports it
    async fn execute(&self, sql: &str) -> DatabaseResult<u64>;

    /// Execute a query and return its rows
    ///
    /// # Arguments
    /// * `sql` - SQL query to execute
    ///
    /// # Returns
    /// Query result with columns and rows
    async fn query(&self, sql: &str) -> DatabaseResult<QueryResult>;

    /// Open a transaction
    async fn begin(&self) -> DatabaseResult<()>;

    /// Commit the open transaction
    async fn commit(&self) -> DatabaseResult<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> DatabaseResult<()>;

    /// Check if the warehouse is reachable
    async fn health_check(&self) -> DatabaseResult<bool> {
        let result = self.query("SELECT 1 AS ok").await?;
        Ok(!result.is_empty())
    }

    /// Get the backend type name
    ///
    /// # Returns
    /// Backend type string ("duckdb" or "postgres")
    fn backend_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.first_string("x"), None);
    }

    #[test]
    fn test_first_values() {
        let result = QueryResult::new(
            vec!["name".to_string(), "count".to_string()],
            vec![
                serde_json::json!({"name": "cats", "count": 10}),
                serde_json::json!({"name": "dogs", "count": 3}),
            ],
        );

        assert_eq!(result.first_string("name"), Some("cats"));
        assert_eq!(result.first_i64("count"), Some(10));
        assert_eq!(result.first_i64("missing"), None);
    }

    #[test]
    fn test_first_i64_parses_strings() {
        let result = QueryResult::new(
            vec!["count".to_string()],
            vec![serde_json::json!({"count": "42"})],
        );
        assert_eq!(result.first_i64("count"), Some(42));
    }
}
