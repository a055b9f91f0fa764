//! DuckDB warehouse backend implementation
//!
//! Provides an embedded warehouse using DuckDB. It supports the statements the
//! loader relies on (transactional DDL, `DELETE ... USING`, window functions,
//! `COPY ... FROM` CSV files), which makes it a faithful local stand-in for
//! Redshift.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::{DatabaseError, DatabaseResult, QueryResult, WarehouseConnection};

/// DuckDB warehouse backend
///
/// Supports both file-based persistence and in-memory mode.
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDBBackend {
    /// Create a new DuckDB backend with a file-based database
    ///
    /// # Arguments
    /// * `db_path` - Path to the DuckDB database file
    ///
    /// # Returns
    /// A new DuckDB backend instance
    pub fn new(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory DuckDB backend
    ///
    /// Useful for testing; nothing is persisted.
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    /// Execute statements without results (transaction control)
    fn execute_batch(&self, sql: &str) -> DatabaseResult<()> {
        let conn = self
            .connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))?;

        conn.execute_batch(sql)
            .map_err(|e| DatabaseError::TransactionFailed(format!("{} failed: {}", sql, e)))
    }

    /// Convert a DuckDB row to a JSON value
    fn row_to_json(row: &duckdb::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for (i, col_name) in columns.iter().enumerate() {
            let value: serde_json::Value = match row.get_ref(i) {
                Ok(value_ref) => Self::value_ref_to_json(value_ref),
                Err(_) => serde_json::Value::Null,
            };
            map.insert(col_name.clone(), value);
        }

        serde_json::Value::Object(map)
    }

    /// Convert a DuckDB ValueRef to a JSON value
    fn value_ref_to_json(value: duckdb::types::ValueRef) -> serde_json::Value {
        use duckdb::types::ValueRef;

        match value {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Boolean(b) => serde_json::Value::Bool(b),
            ValueRef::TinyInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::SmallInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::Int(i) => serde_json::Value::Number(i.into()),
            ValueRef::BigInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::HugeInt(i) => {
                // COUNT(*) and SUM come back as HUGEINT; keep them numeric when they fit
                i64::try_from(i)
                    .map(|n| serde_json::Value::Number(n.into()))
                    .unwrap_or_else(|_| serde_json::Value::String(i.to_string()))
            }
            ValueRef::UTinyInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::USmallInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::UInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::UBigInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::Float(f) => serde_json::Number::from_f64(f as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Double(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
            ValueRef::Blob(bytes) => {
                // Encode blob as base64
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            ValueRef::Decimal(d) => serde_json::Value::String(d.to_string()),
            // Timestamps, dates, intervals and nested types keep their debug rendering
            other => serde_json::Value::String(format!("{:?}", other)),
        }
    }
}

#[async_trait(?Send)]
impl WarehouseConnection for DuckDBBackend {
    async fn execute(&self, sql: &str) -> DatabaseResult<u64> {
        debug!("duckdb execute: {}", sql);

        let conn = self
            .connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))?;

        conn.execute(sql, [])
            .map(|n| n as u64)
            .map_err(|e| DatabaseError::QueryFailed(format!("Execute failed: {}", e)))
    }

    async fn query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();

        let conn = self
            .connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        // In DuckDB 1.4+, we need to execute the query first, then get columns
        let mut result_rows = stmt
            .query([])
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            rows.push(Self::row_to_json(row, &columns));
        }

        Ok(QueryResult {
            columns,
            rows,
            rows_affected: None,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn begin(&self) -> DatabaseResult<()> {
        self.execute_batch("BEGIN TRANSACTION")
    }

    async fn commit(&self) -> DatabaseResult<()> {
        self.execute_batch("COMMIT")
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        self.execute_batch("ROLLBACK")
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }
}
