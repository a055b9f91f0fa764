//! Batch write coordination
//!
//! [`BatchWriter::write_batch`] loads one batch as one warehouse transaction:
//!
//! ```text
//! Validating -> SchemaReconciling -> Staging -> BulkLoading -> Merging -> Committed
//!      \              \                 \            \            \
//!       +--------------+-----------------+------------+------------+--> RolledBack
//! ```
//!
//! A batch carrying a version older than the table's ends as
//! [`WriteOutcome::Stale`], and an empty batch for a table that does not exist
//! yet ends as [`WriteOutcome::Skipped`] unless empty tables are persisted.
//! Both roll back and return `Ok`.

mod merge;
mod plan;

pub use merge::MergeStatements;
pub use plan::{ColumnAction, ColumnPlan, Route, plan_columns};

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::{LoaderConfig, WarehouseConnection};
use crate::dialect::{WarehouseDialect, native_base_type};
use crate::error::{LoaderError, LoaderResult, StorageContext};
use crate::lifecycle::{Activation, DesiredColumn, TableLifecycleManager};
use crate::models::{SEQUENCE_COLUMN, StreamBatch, TableSchema};
use crate::staging::{ObjectStager, encode_rows};
use crate::validation::{IdentifierPolicy, ValidationResult};

/// Step of a batch write, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Validating,
    SchemaReconciling,
    Staging,
    BulkLoading,
    Merging,
    Committed,
    RolledBack,
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteState::Validating => "validating",
            WriteState::SchemaReconciling => "schema-reconciling",
            WriteState::Staging => "staging",
            WriteState::BulkLoading => "bulk-loading",
            WriteState::Merging => "merging",
            WriteState::Committed => "committed",
            WriteState::RolledBack => "rolled-back",
        };
        write!(f, "{}", name)
    }
}

/// How a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Rows were merged and the transaction committed
    Written,
    /// The batch's version is older than the table's; nothing changed
    Stale,
    /// Empty batch for a table that does not exist; nothing changed
    Skipped,
}

/// Result of one batch write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Physical table written (a shadow table for a newer version)
    pub table: String,
    /// Rows staged and bulk-loaded
    pub rows_loaded: usize,
    /// Rows inserted into the destination by the merge
    pub rows_merged: u64,
    pub outcome: WriteOutcome,
}

impl WriteResult {
    fn unchanged(table: impl Into<String>, outcome: WriteOutcome) -> Self {
        Self {
            table: table.into(),
            rows_loaded: 0,
            rows_merged: 0,
            outcome,
        }
    }
}

/// Loads stream batches into the warehouse
pub struct BatchWriter {
    connection: Arc<dyn WarehouseConnection>,
    dialect: Arc<dyn WarehouseDialect>,
    stager: Arc<dyn ObjectStager>,
    lifecycle: TableLifecycleManager,
    policy: IdentifierPolicy,
    persist_empty_tables: bool,
}

impl BatchWriter {
    /// Create a writer for the schema and identifier rules of `config`
    pub fn new(
        connection: Arc<dyn WarehouseConnection>,
        dialect: Arc<dyn WarehouseDialect>,
        stager: Arc<dyn ObjectStager>,
        config: &LoaderConfig,
    ) -> Self {
        let policy = config.identifier_policy(dialect.max_identifier_length());
        let lifecycle = TableLifecycleManager::new(
            connection.clone(),
            dialect.clone(),
            config.warehouse.schema.clone(),
            policy,
        );

        Self {
            connection,
            dialect,
            stager,
            lifecycle,
            policy,
            persist_empty_tables: config.loader.persist_empty_tables,
        }
    }

    pub fn lifecycle(&self) -> &TableLifecycleManager {
        &self.lifecycle
    }

    /// Create the target schema and metadata table
    pub async fn initialize(&self) -> LoaderResult<()> {
        self.lifecycle.initialize().await
    }

    fn table_name(&self, stream: &str) -> ValidationResult<String> {
        self.dialect
            .canonicalize_identifier(stream, "table name", &self.policy)
    }

    /// Load one batch atomically
    ///
    /// Every statement of the batch, DDL included, runs in one transaction. On
    /// failure the transaction is rolled back and the error is returned; the
    /// batch can be replayed whole.
    pub async fn write_batch(&self, batch: &StreamBatch) -> LoaderResult<WriteResult> {
        let table = self.table_name(&batch.stream)?;

        self.connection
            .begin()
            .await
            .context(|| format!("opening a transaction for {}", table))?;

        let result = match self.write_in_transaction(&table, batch).await {
            Ok(result) if result.outcome == WriteOutcome::Written => {
                match self.connection.commit().await {
                    Ok(()) => {
                        debug!(table = %result.table, state = %WriteState::Committed, "batch state");
                        return Ok(result);
                    }
                    Err(e) => Err(LoaderError::storage(format!("committing {}", table), e)),
                }
            }
            other => other,
        };

        if let Err(e) = self.connection.rollback().await {
            warn!("Rollback of {} failed: {}", table, e);
        }
        debug!(table = %table, state = %WriteState::RolledBack, "batch state");

        if let Err(e) = &result {
            error!("Failed to write batch of {} rows to {}: {}", batch.len(), table, e);
        }
        result
    }

    /// Load batches in order, stopping at the first error
    pub async fn write_batches(&self, batches: &[StreamBatch]) -> LoaderResult<Vec<WriteResult>> {
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            results.push(self.write_batch(batch).await?);
        }
        Ok(results)
    }

    /// Replace a stream's table with its loaded shadow table of `version`
    pub async fn activate_version(&self, stream: &str, version: i64) -> LoaderResult<Activation> {
        let table = self.table_name(stream)?;
        self.lifecycle.activate_version(&table, version).await
    }

    async fn write_in_transaction(&self, table: &str, batch: &StreamBatch) -> LoaderResult<WriteResult> {
        debug!(table = %table, rows = batch.len(), state = %WriteState::Validating, "batch state");

        let batch = batch.with_sequence();
        batch.validate_keys()?;

        let canonical = self.lifecycle.get_table_metadata(table).await?;
        let current_version = canonical.as_ref().and_then(|m| m.version);

        let (destination, metadata) = match (batch.version, current_version) {
            (Some(version), Some(current)) if version < current => {
                info!(
                    "Skipping batch of {} with version {}: table is at version {}",
                    table, version, current
                );
                return Ok(WriteResult::unchanged(table, WriteOutcome::Stale));
            }
            (Some(version), Some(current)) if version > current => {
                let shadow = self.lifecycle.shadow_table_name(table, version)?;
                let metadata = self.lifecycle.get_table_metadata(&shadow).await?;
                (shadow, metadata)
            }
            _ => (table.to_string(), canonical),
        };

        if let Some(metadata) = &metadata {
            self.validate_keys_against(metadata, &batch)?;
        }

        if batch.is_empty()
            && !self.persist_empty_tables
            && !self.lifecycle.table_exists(&destination).await?
        {
            debug!("Empty batch for missing table {}, skipping", destination);
            return Ok(WriteResult::unchanged(destination, WriteOutcome::Skipped));
        }

        debug!(table = %destination, state = %WriteState::SchemaReconciling, "batch state");
        let mut metadata = self
            .lifecycle
            .ensure_table(&destination, batch.version, &batch.key_properties)
            .await?;
        self.validate_keys_against(&metadata, &batch)?;

        let schema = self.dialect.force_nullable(&batch.schema);
        let plan = plan_columns(&metadata, &schema, self.dialect.as_ref(), &self.policy)?;
        self.apply_plan(&mut metadata, &plan).await?;

        if batch.is_empty() {
            return Ok(WriteResult::unchanged(destination, WriteOutcome::Written));
        }

        let key_columns = batch
            .key_properties
            .iter()
            .map(|key| single_column(&plan, key, "key property"))
            .collect::<LoaderResult<Vec<_>>>()?;
        let subkey_columns = batch
            .subkeys()
            .iter()
            .filter_map(|subkey| plan.single_column(subkey).map(str::to_string))
            .collect::<Vec<_>>();
        let sequence_column = single_column(&plan, SEQUENCE_COLUMN, "sequence column")?;

        debug!(table = %destination, state = %WriteState::Staging, "batch state");
        let columns: Vec<String> = metadata.data_columns().into_iter().map(String::from).collect();
        let rows = batch
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| plan.route_row(&batch.stream, index, row))
            .collect::<ValidationResult<Vec<_>>>()?;

        let body = encode_rows(&columns, &rows)?;
        let object = self
            .stager
            .stage(body, &format!("{}__", destination))
            .await
            .context(|| format!("staging rows of {}", destination))?;

        debug!(table = %destination, location = %object.location, state = %WriteState::BulkLoading, "batch state");
        let temp = self
            .dialect
            .quote_identifier(&format!("tmp_{}", Uuid::new_v4().simple()));
        let target = self.lifecycle.qualified(&destination);

        self.execute(
            &self.dialect.create_staging_table_sql(&temp, &target),
            || format!("creating a staging table for {}", destination),
        )
        .await?;
        self.execute(
            &self
                .dialect
                .copy_sql(&temp, &columns, &object, self.stager.credentials().as_ref()),
            || format!("bulk-loading {}", object.location),
        )
        .await?;

        debug!(table = %destination, state = %WriteState::Merging, "batch state");
        let merge = MergeStatements::new(
            self.dialect.as_ref(),
            self.lifecycle.schema(),
            &destination,
            temp,
            &columns,
            sequence_column,
        )
        .with_keys(key_columns)
        .with_subkeys(subkey_columns);

        let mut rows_merged = 0;
        for statement in merge.statements() {
            rows_merged = self
                .execute(&statement, || format!("merging rows into {}", destination))
                .await?;
        }
        self.execute(&merge.drop_temp_sql(), || {
            format!("dropping the staging table of {}", destination)
        })
        .await?;

        info!(
            "Loaded {} rows into {} ({} inserted)",
            rows.len(),
            destination,
            rows_merged
        );

        Ok(WriteResult {
            table: destination,
            rows_loaded: rows.len(),
            rows_merged,
            outcome: WriteOutcome::Written,
        })
    }

    async fn execute(&self, sql: &str, context: impl FnOnce() -> String) -> LoaderResult<u64> {
        self.connection.execute(sql).await.context(context)
    }

    async fn apply_plan(&self, metadata: &mut TableSchema, plan: &ColumnPlan) -> LoaderResult<()> {
        let mut desired: Vec<DesiredColumn> = Vec::new();

        for action in &plan.actions {
            match action {
                ColumnAction::Rename { from, to } => {
                    self.lifecycle.rename_column(metadata, from, to).await?;
                }
                ColumnAction::Add(column) => desired.push(column.clone()),
            }
        }

        self.lifecycle.reconcile_columns(metadata, &desired).await?;
        Ok(())
    }

    /// Key properties must match the table's, by name and native type
    fn validate_keys_against(&self, metadata: &TableSchema, batch: &StreamBatch) -> LoaderResult<()> {
        let lower = |keys: &[String]| {
            let mut keys: Vec<String> = keys.iter().map(|k| k.to_lowercase()).collect();
            keys.sort();
            keys.dedup();
            keys
        };

        if lower(&metadata.key_properties) != lower(&batch.key_properties) {
            return Err(LoaderError::SchemaIncompatibility(format!(
                "key properties of {} changed from {:?} to {:?}",
                metadata.name, metadata.key_properties, batch.key_properties
            )));
        }

        for key in &batch.key_properties {
            let Some(schema) = batch.schema.get(key) else {
                return Err(LoaderError::SchemaIncompatibility(format!(
                    "key property '{}' of {} is missing from the schema",
                    key, batch.stream
                )));
            };

            let wanted = native_base_type(&self.dialect.to_native_type(&schema.make_nullable()));
            let mut existing = metadata.columns_from(key).peekable();
            if existing.peek().is_some()
                && !existing.any(|(_, mapping)| native_base_type(&mapping.sql_type) == wanted)
            {
                return Err(LoaderError::SchemaIncompatibility(format!(
                    "key property '{}' of {} cannot change type to {}",
                    key, metadata.name, wanted
                )));
            }
        }

        Ok(())
    }
}

fn single_column(plan: &ColumnPlan, property: &str, role: &str) -> LoaderResult<String> {
    plan.single_column(property)
        .map(str::to_string)
        .ok_or_else(|| {
            LoaderError::SchemaIncompatibility(format!(
                "{} '{}' must map to exactly one column",
                role, property
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_state_display() {
        assert_eq!(WriteState::SchemaReconciling.to_string(), "schema-reconciling");
        assert_eq!(WriteState::RolledBack.to_string(), "rolled-back");
    }

    #[test]
    fn test_unchanged_result() {
        let result = WriteResult::unchanged("cats", WriteOutcome::Stale);
        assert_eq!(result.rows_loaded, 0);
        assert_eq!(result.rows_merged, 0);
        assert_eq!(result.outcome, WriteOutcome::Stale);
    }
}
