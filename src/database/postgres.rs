//! PostgreSQL-wire warehouse backend implementation
//!
//! Connects to Redshift (or PostgreSQL, for development) over the PostgreSQL
//! wire protocol. Statements run through the simple query protocol, which
//! Redshift supports for every statement the loader issues including `COPY`;
//! queries use the extended protocol to get typed values back.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::SimpleQueryMessage;
use tracing::{debug, error};

use super::{DatabaseError, DatabaseResult, QueryResult, WarehouseConnection};

/// PostgreSQL-wire warehouse backend
pub struct PostgresBackend {
    /// Connection string
    connection_string: String,
    /// PostgreSQL client (wrapped for async access)
    client: Arc<Mutex<tokio_postgres::Client>>,
}

impl PostgresBackend {
    /// Create a new backend
    ///
    /// # Arguments
    /// * `connection_string` - libpq-style connection string or URL
    ///
    /// # Returns
    /// A connected backend instance
    pub async fn new(connection_string: &str) -> DatabaseResult<Self> {
        let (client, connection) =
            tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
                .await
                .map_err(|e| {
                    DatabaseError::ConnectionFailed(format!("Failed to connect to warehouse: {}", e))
                })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Warehouse connection error: {}", e);
            }
        });

        Ok(Self {
            connection_string: connection_string.to_string(),
            client: Arc::new(Mutex::new(client)),
        })
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        mask_password(&self.connection_string)
    }

    /// Convert a PostgreSQL row to a JSON value
    fn row_to_json(row: &tokio_postgres::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for (i, col_name) in columns.iter().enumerate() {
            let value = Self::get_column_value(row, i);
            map.insert(col_name.clone(), value);
        }

        serde_json::Value::Object(map)
    }

    /// Get a column value as JSON
    fn get_column_value(row: &tokio_postgres::Row, idx: usize) -> serde_json::Value {
        // Try different types
        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return v
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return v
                .map(|n| serde_json::Value::Number(n.into()))
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return v
                .map(|n| serde_json::Value::Number(n.into()))
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i16>>(idx) {
            return v
                .map(|n| serde_json::Value::Number(n.into()))
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return v
                .map(serde_json::Value::Bool)
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return v
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null);
        }

        serde_json::Value::Null
    }

    async fn simple(&self, sql: &str) -> DatabaseResult<u64> {
        let client = self.client.lock().await;

        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Execute failed: {}", e)))?;

        Ok(messages
            .iter()
            .map(|message| match message {
                SimpleQueryMessage::CommandComplete(n) => *n,
                _ => 0,
            })
            .sum())
    }
}

/// Replace the password of a `user:password@host` URL with asterisks
fn mask_password(connection_string: &str) -> String {
    if let Some(at_pos) = connection_string.find('@')
        && let Some(colon_pos) = connection_string[..at_pos].rfind(':')
    {
        let prefix = &connection_string[..colon_pos + 1];
        let suffix = &connection_string[at_pos..];
        return format!("{}****{}", prefix, suffix);
    }
    connection_string.to_string()
}

#[async_trait(?Send)]
impl WarehouseConnection for PostgresBackend {
    async fn execute(&self, sql: &str) -> DatabaseResult<u64> {
        debug!("postgres execute: {}", sql);
        self.simple(sql).await
    }

    async fn query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();
        let client = self.client.lock().await;

        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => Vec::new(),
        };

        let json_rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| Self::row_to_json(row, &columns))
            .collect();

        Ok(QueryResult {
            columns,
            rows: json_rows,
            rows_affected: None,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn begin(&self) -> DatabaseResult<()> {
        self.simple("BEGIN")
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    async fn commit(&self) -> DatabaseResult<()> {
        self.simple("COMMIT")
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        self.simple("ROLLBACK")
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
