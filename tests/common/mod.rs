//! Shared fixtures: an in-memory DuckDB warehouse staged through a temp directory

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

use target_redshift::database::{DatabaseError, DatabaseResult, QueryResult};
use target_redshift::staging::{AccessCredentials, StagedObject, StagingError, StagingResult};
use target_redshift::{
    BatchWriter, DuckDBBackend, DuckDbDialect, JsonSchema, LoaderConfig, LocalStager,
    ObjectStager, Row, StreamBatch, TableJsonSchema, WarehouseConnection,
};

pub struct Warehouse {
    pub backend: Arc<DuckDBBackend>,
    pub writer: BatchWriter,
    pub staging: TempDir,
}

impl Warehouse {
    /// Rows of a query as JSON objects
    pub async fn rows(&self, sql: &str) -> Vec<Value> {
        self.backend.query(sql).await.unwrap().rows
    }

    pub async fn count(&self, table: &str) -> i64 {
        self.backend
            .query(&format!("SELECT COUNT(*) AS count FROM \"public\".\"{}\"", table))
            .await
            .unwrap()
            .first_i64("count")
            .unwrap()
    }

    pub async fn table_exists(&self, table: &str) -> bool {
        self.writer.lifecycle().table_exists(table).await.unwrap()
    }

    /// Column names of a table, in creation order
    pub async fn columns(&self, table: &str) -> Vec<String> {
        self.rows(&format!(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = '{}' ORDER BY ordinal_position",
            table
        ))
        .await
        .iter()
        .map(|row| row["column_name"].as_str().unwrap().to_string())
        .collect()
    }
}

pub fn config() -> LoaderConfig {
    LoaderConfig::duckdb(":memory:")
}

pub async fn warehouse() -> Warehouse {
    warehouse_with(config()).await
}

pub async fn warehouse_with(config: LoaderConfig) -> Warehouse {
    let backend = Arc::new(DuckDBBackend::in_memory().unwrap());
    let staging = tempfile::tempdir().unwrap();
    let stager = Arc::new(LocalStager::new(staging.path(), "").unwrap());

    let writer = BatchWriter::new(backend.clone(), Arc::new(DuckDbDialect), stager, &config);
    writer.initialize().await.unwrap();

    Warehouse {
        backend,
        writer,
        staging,
    }
}

/// A writer whose connection fails every statement matching `fails`
pub async fn failing_warehouse(fails: fn(&str) -> bool) -> (Warehouse, BatchWriter) {
    let warehouse = warehouse().await;
    let connection = Arc::new(FailingConnection {
        inner: warehouse.backend.clone(),
        fails,
    });
    let stager = Arc::new(LocalStager::new(warehouse.staging.path(), "").unwrap());
    let writer = BatchWriter::new(connection, Arc::new(DuckDbDialect), stager, &config());
    (warehouse, writer)
}

/// A writer whose stager rejects every upload
pub async fn unreachable_storage_warehouse() -> (Warehouse, BatchWriter) {
    let warehouse = warehouse().await;
    let writer = BatchWriter::new(
        warehouse.backend.clone(),
        Arc::new(DuckDbDialect),
        Arc::new(UnreachableStager),
        &config(),
    );
    (warehouse, writer)
}

pub struct FailingConnection {
    inner: Arc<DuckDBBackend>,
    fails: fn(&str) -> bool,
}

#[async_trait(?Send)]
impl WarehouseConnection for FailingConnection {
    async fn execute(&self, sql: &str) -> DatabaseResult<u64> {
        if (self.fails)(sql) {
            return Err(DatabaseError::QueryFailed("injected failure".to_string()));
        }
        self.inner.execute(sql).await
    }

    async fn query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        self.inner.query(sql).await
    }

    async fn begin(&self) -> DatabaseResult<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> DatabaseResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        self.inner.rollback().await
    }

    fn backend_type(&self) -> &'static str {
        "failing"
    }
}

pub struct UnreachableStager;

#[async_trait(?Send)]
impl ObjectStager for UnreachableStager {
    async fn stage(&self, _body: Vec<u8>, _key_prefix: &str) -> StagingResult<StagedObject> {
        Err(StagingError::UploadFailed("connection refused".to_string()))
    }

    fn credentials(&self) -> Option<AccessCredentials> {
        None
    }

    fn stager_type(&self) -> &'static str {
        "unreachable"
    }
}

pub fn row(value: Value) -> Row {
    value.as_object().unwrap().clone()
}

/// `cats` stream keyed by `id`, with a nullable `name`
pub fn cats_schema() -> TableJsonSchema {
    TableJsonSchema::new()
        .with_property("id", JsonSchema::integer())
        .with_property("name", JsonSchema::string().make_nullable())
}

pub fn cats(rows: Vec<Value>) -> StreamBatch {
    StreamBatch::new("cats", cats_schema(), vec!["id".to_string()])
        .with_rows(rows.into_iter().map(row).collect())
}
