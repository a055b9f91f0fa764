//! target-redshift - batch ingestion and schema reconciliation for column-store warehouses
//!
//! Provides:
//! - Batch loading with key-based upserts ordered by sequence number
//! - Additive schema evolution (nullable columns, column splitting on type conflicts)
//! - Versioned shadow tables for full-table replication
//! - Object staging (local directory, S3) and bulk loads through `COPY`
//! - Warehouse dialects (Redshift, DuckDB) and connections (DuckDB, PostgreSQL wire)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use target_redshift::{BatchWriter, DuckDBBackend, DuckDbDialect, LoaderConfig, LocalStager};
//!
//! let config = LoaderConfig::duckdb("warehouse.duckdb");
//! let writer = BatchWriter::new(
//!     Arc::new(DuckDBBackend::new("warehouse.duckdb")?),
//!     Arc::new(DuckDbDialect),
//!     Arc::new(LocalStager::new(".staging", "")?),
//!     &config,
//! );
//! writer.initialize().await?;
//! let result = writer.write_batch(&batch).await?;
//! ```

pub mod database;
pub mod dialect;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod staging;
pub mod validation;
pub mod writer;

// Re-export commonly used types
#[cfg(feature = "duckdb-backend")]
pub use database::DuckDBBackend;
#[cfg(feature = "postgres-backend")]
pub use database::PostgresBackend;
pub use database::{
    BackendType, DatabaseError, DatabaseResult, LoaderConfig, QueryResult, StagerType,
    WarehouseConnection,
};

pub use dialect::{DuckDbDialect, RedshiftDialect, WarehouseDialect};
pub use error::{LoaderError, LoaderResult};
pub use lifecycle::{Activation, DesiredColumn, TableLifecycleManager};

pub use models::{
    Column, ColumnMapping, JsonSchema, JsonType, Row, StreamBatch, TableJsonSchema, TableSchema,
};

#[cfg(feature = "native-fs")]
pub use staging::LocalStager;
#[cfg(feature = "s3")]
pub use staging::{S3Stager, S3StagingConfig};
pub use staging::{AccessCredentials, ObjectStager, StagedObject, StagingError, StagingResult};

pub use validation::{IdentifierPolicy, ValidationError, ValidationResult};
pub use writer::{BatchWriter, WriteOutcome, WriteResult, WriteState};
