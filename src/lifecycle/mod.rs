//! Table lifecycle management
//!
//! The [`TableLifecycleManager`] owns every DDL statement the loader issues and
//! the reserved metadata table recording, per physical table, its declared
//! version, key properties and column mapping.
//!
//! Schema evolution is additive only: columns are added (always nullable) and
//! renamed when a column has to be split, but never altered in place, narrowed
//! or dropped. Apart from [`TableLifecycleManager::activate_version`], which
//! runs its own transaction, every operation expects to run inside the
//! caller's open transaction so that a failed batch rolls its DDL back too.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::{MetadataSchema, WarehouseConnection};
use crate::dialect::WarehouseDialect;
use crate::error::{LoaderError, LoaderResult, StorageContext};
use crate::models::{
    CREATE_TABLE_PLACEHOLDER_COLUMN, Column, ColumnMapping, JsonSchema, TableSchema,
};
use crate::validation::{IdentifierPolicy, suffixed_identifier};

/// Native type of the placeholder column
pub const CREATE_TABLE_PLACEHOLDER_TYPE: &str = "BOOLEAN";

/// A column the caller wants to exist
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredColumn {
    /// Physical column name (already canonical)
    pub name: String,
    /// Source property the column holds
    pub from: String,
    /// Abstract type of the values
    pub json_schema: JsonSchema,
}

impl DesiredColumn {
    pub fn new(name: impl Into<String>, from: impl Into<String>, json_schema: JsonSchema) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            json_schema,
        }
    }
}

/// A column as reported by `information_schema`
#[derive(Debug, Clone, PartialEq)]
pub struct DescribedColumn {
    pub name: String,
    pub data_type: String,
    pub json_schema: JsonSchema,
}

impl DescribedColumn {
    /// Mapping of an adopted column
    ///
    /// The catalog spelling (`character varying`, `DOUBLE`) is replaced by the
    /// dialect's own type so that later type comparisons see one spelling.
    pub fn mapping(&self, dialect: &dyn WarehouseDialect) -> ColumnMapping {
        ColumnMapping::new(
            dialect.to_native_type(&self.json_schema),
            self.json_schema.clone(),
            self.name.clone(),
        )
    }
}

/// Result of an explicit version swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The shadow table replaced the canonical table
    Activated,
    /// The canonical table already has this version
    AlreadyActive,
    /// The canonical table has a newer version; nothing changed
    Stale,
}

/// Owner of physical tables and their metadata in one target schema
#[derive(Clone)]
pub struct TableLifecycleManager {
    connection: Arc<dyn WarehouseConnection>,
    dialect: Arc<dyn WarehouseDialect>,
    schema: String,
    policy: IdentifierPolicy,
}

impl TableLifecycleManager {
    pub fn new(
        connection: Arc<dyn WarehouseConnection>,
        dialect: Arc<dyn WarehouseDialect>,
        schema: impl Into<String>,
        policy: IdentifierPolicy,
    ) -> Self {
        Self {
            connection,
            dialect,
            schema: schema.into(),
            policy,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn metadata(&self) -> MetadataSchema<'_> {
        MetadataSchema::new(self.dialect.as_ref(), &self.schema)
    }

    /// Quoted, schema-qualified table name
    pub fn qualified(&self, table: &str) -> String {
        self.dialect.qualified_name(&self.schema, table)
    }

    /// Name of the shadow table loading `version` of `table`
    pub fn shadow_table_name(&self, table: &str, version: i64) -> LoaderResult<String> {
        Ok(suffixed_identifier(
            table,
            &version.to_string(),
            "table name",
            &self.policy,
        )?)
    }

    async fn execute(&self, sql: &str, context: impl FnOnce() -> String) -> LoaderResult<u64> {
        self.connection.execute(sql).await.context(context)
    }

    /// Create the target schema and the metadata table if absent
    pub async fn initialize(&self) -> LoaderResult<()> {
        let metadata = self.metadata();
        self.execute(&metadata.create_schema_sql(), || {
            format!("creating schema {}", self.schema)
        })
        .await?;
        self.execute(&metadata.create_table_sql(), || {
            "creating the metadata table".to_string()
        })
        .await?;
        Ok(())
    }

    /// Whether a physical table exists in the target schema
    pub async fn table_exists(&self, table: &str) -> LoaderResult<bool> {
        let result = self
            .connection
            .query(&self.metadata().table_exists_sql(table))
            .await
            .context(|| format!("checking whether table {} exists", table))?;
        Ok(result.first_i64("count").unwrap_or(0) > 0)
    }

    /// Read the metadata document of a table
    pub async fn get_table_metadata(&self, table: &str) -> LoaderResult<Option<TableSchema>> {
        let result = self
            .connection
            .query(&self.metadata().select_sql(table))
            .await
            .context(|| format!("reading metadata of table {}", table))?;

        match result.first_string("metadata") {
            Some(document) => TableSchema::from_json(document).map(Some).map_err(|e| {
                LoaderError::SchemaIncompatibility(format!(
                    "metadata of table {} is unreadable: {}",
                    table, e
                ))
            }),
            None => Ok(None),
        }
    }

    /// Replace the metadata document of a table
    pub async fn set_table_metadata(&self, table: &mut TableSchema) -> LoaderResult<()> {
        table.updated_at = Some(Utc::now());
        let document = table.to_json().map_err(|e| {
            LoaderError::SchemaIncompatibility(format!(
                "metadata of table {} cannot be serialized: {}",
                table.name, e
            ))
        })?;

        let metadata = self.metadata();
        self.execute(&metadata.delete_sql(&table.name), || {
            format!("replacing metadata of table {}", table.name)
        })
        .await?;
        self.execute(&metadata.insert_sql(&table.name, &document), || {
            format!("replacing metadata of table {}", table.name)
        })
        .await?;
        Ok(())
    }

    async fn delete_table_metadata(&self, table: &str) -> LoaderResult<()> {
        self.execute(&self.metadata().delete_sql(table), || {
            format!("deleting metadata of table {}", table)
        })
        .await?;
        Ok(())
    }

    /// Columns of a physical table, mapped back to abstract types
    pub async fn describe_columns(&self, table: &str) -> LoaderResult<Vec<DescribedColumn>> {
        let result = self
            .connection
            .query(&self.metadata().describe_columns_sql(table))
            .await
            .context(|| format!("describing table {}", table))?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.get("column_name")?.as_str()?.to_string();
                let data_type = row.get("data_type")?.as_str()?.to_string();
                let nullable = row
                    .get("is_nullable")
                    .and_then(|v| v.as_str())
                    .is_none_or(|v| v.eq_ignore_ascii_case("yes"));
                let json_schema = self.dialect.from_native_type(&data_type, nullable);
                Some(DescribedColumn {
                    name,
                    data_type,
                    json_schema,
                })
            })
            .collect())
    }

    /// Make sure a physical table exists and return its metadata
    ///
    /// A new table gets exactly one placeholder column. An existing table
    /// without metadata is adopted by describing its columns. A provided
    /// `version` is recorded either way.
    pub async fn ensure_table(
        &self,
        table: &str,
        version: Option<i64>,
        key_properties: &[String],
    ) -> LoaderResult<TableSchema> {
        if !self.table_exists(table).await? {
            return self.create_table(table, version, key_properties).await;
        }

        let (mut metadata, mut changed) = match self.get_table_metadata(table).await? {
            Some(metadata) => (metadata, false),
            None => (self.adopt_table(table, key_properties).await?, true),
        };

        if version.is_some() && metadata.version != version {
            debug!(
                "Recording version {:?} on table {} (was {:?})",
                version, table, metadata.version
            );
            metadata.version = version;
            changed = true;
        }

        if changed {
            self.set_table_metadata(&mut metadata).await?;
        }

        Ok(metadata)
    }

    async fn create_table(
        &self,
        table: &str,
        version: Option<i64>,
        key_properties: &[String],
    ) -> LoaderResult<TableSchema> {
        let sql = format!(
            "CREATE TABLE {} ({} {})",
            self.qualified(table),
            self.dialect.quote_identifier(CREATE_TABLE_PLACEHOLDER_COLUMN),
            CREATE_TABLE_PLACEHOLDER_TYPE
        );
        self.execute(&sql, || format!("creating table {}", table)).await?;
        info!("Created table {}.{}", self.schema, table);

        let mut metadata = TableSchema::new(table)
            .with_version(version)
            .with_key_properties(key_properties.to_vec());
        metadata.add_mapping(
            CREATE_TABLE_PLACEHOLDER_COLUMN,
            ColumnMapping::new(
                CREATE_TABLE_PLACEHOLDER_TYPE,
                JsonSchema::boolean().make_nullable(),
                CREATE_TABLE_PLACEHOLDER_COLUMN,
            ),
        );
        self.set_table_metadata(&mut metadata).await?;

        Ok(metadata)
    }

    async fn adopt_table(&self, table: &str, key_properties: &[String]) -> LoaderResult<TableSchema> {
        info!("Adopting existing table {}.{} without metadata", self.schema, table);

        let mut metadata = TableSchema::new(table).with_key_properties(key_properties.to_vec());
        for column in self.describe_columns(table).await? {
            metadata.add_mapping(column.name.clone(), column.mapping(self.dialect.as_ref()));
        }
        Ok(metadata)
    }

    /// Add every desired column missing from the mapping
    ///
    /// New columns are created nullable with the dialect's native type.
    /// Columns already mapped are left untouched. Returns the columns added.
    pub async fn reconcile_columns(
        &self,
        table: &mut TableSchema,
        desired: &[DesiredColumn],
    ) -> LoaderResult<Vec<Column>> {
        let mut applied = Vec::new();

        for wanted in desired {
            if table.has_column(&wanted.name) {
                continue;
            }

            let column = self.dialect.column(&wanted.name, &wanted.json_schema);
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.qualified(&table.name),
                column.definition(&self.dialect.quote_identifier(&column.name))
            );
            self.execute(&sql, || {
                format!("adding column {} to table {}", column.name, table.name)
            })
            .await?;
            debug!("Added column {} {} to {}", column.name, column.sql_type, table.name);

            table.add_mapping(
                column.name.clone(),
                ColumnMapping::new(
                    column.sql_type.clone(),
                    wanted.json_schema.make_nullable(),
                    wanted.from.clone(),
                ),
            );
            applied.push(column);
        }

        if !applied.is_empty() {
            self.set_table_metadata(table).await?;
        }

        Ok(applied)
    }

    /// Rename a physical column and move its mapping
    pub async fn rename_column(&self, table: &mut TableSchema, from: &str, to: &str) -> LoaderResult<()> {
        let sql = format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.qualified(&table.name),
            self.dialect.quote_identifier(from),
            self.dialect.quote_identifier(to)
        );
        self.execute(&sql, || {
            format!("renaming column {} of table {} to {}", from, table.name, to)
        })
        .await?;
        debug!("Renamed column {}.{} to {}", table.name, from, to);

        table.rename_mapping(from, to);
        self.set_table_metadata(table).await
    }

    /// Swap the shadow table of `version` into place, in one transaction
    ///
    /// Drops the canonical table, renames `<table>__<version>` to `<table>` and
    /// moves its metadata. Activating a version older than the canonical
    /// table's is a logged no-op, and so is activating its own version.
    pub async fn activate_version(&self, table: &str, version: i64) -> LoaderResult<Activation> {
        self.connection
            .begin()
            .await
            .context(|| format!("opening a transaction to activate {} version {}", table, version))?;

        match self.swap_version(table, version).await {
            Ok(activation) => {
                self.connection
                    .commit()
                    .await
                    .context(|| format!("committing activation of {} version {}", table, version))?;
                Ok(activation)
            }
            Err(e) => {
                // The original failure is what the caller needs to see
                let _ = self.connection.rollback().await;
                Err(e)
            }
        }
    }

    async fn swap_version(&self, table: &str, version: i64) -> LoaderResult<Activation> {
        let current = self.get_table_metadata(table).await?.and_then(|m| m.version);

        match current {
            Some(current) if version < current => {
                info!(
                    "Not activating {} version {}: table is already at version {}",
                    table, version, current
                );
                return Ok(Activation::Stale);
            }
            Some(current) if version == current => {
                debug!("{} version {} is already active", table, version);
                return Ok(Activation::AlreadyActive);
            }
            _ => {}
        }

        let shadow = self.shadow_table_name(table, version)?;
        if !self.table_exists(&shadow).await? {
            return Err(LoaderError::SchemaIncompatibility(format!(
                "cannot activate {} version {}: table {} does not exist",
                table, version, shadow
            )));
        }

        let mut metadata = self
            .get_table_metadata(&shadow)
            .await?
            .unwrap_or_else(|| TableSchema::new(shadow.clone()));

        self.execute(
            &format!("DROP TABLE IF EXISTS {}", self.qualified(table)),
            || format!("dropping table {}", table),
        )
        .await?;
        self.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                self.qualified(&shadow),
                self.dialect.quote_identifier(table)
            ),
            || format!("renaming table {} to {}", shadow, table),
        )
        .await?;

        self.delete_table_metadata(&shadow).await?;
        metadata.name = table.to_string();
        metadata.version = Some(version);
        self.set_table_metadata(&mut metadata).await?;

        info!("Activated {} version {}", table, version);
        Ok(Activation::Activated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DuckDbDialect, RedshiftDialect, native_base_type};

    fn described(dialect: &dyn WarehouseDialect, name: &str, data_type: &str) -> DescribedColumn {
        DescribedColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
            json_schema: dialect.from_native_type(data_type, true),
        }
    }

    #[test]
    fn test_adopted_redshift_string_uses_dialect_type() {
        let dialect = RedshiftDialect::default();
        let mapping = described(&dialect, "id", "character varying").mapping(&dialect);

        assert_eq!(mapping.from, "id");
        assert_eq!(mapping.json_schema, JsonSchema::string().make_nullable());
        assert_eq!(
            native_base_type(&mapping.sql_type),
            native_base_type(&dialect.to_native_type(&JsonSchema::string().make_nullable()))
        );
    }

    #[test]
    fn test_adopted_duckdb_double_uses_dialect_type() {
        let dialect = DuckDbDialect;
        let mapping = described(&dialect, "weight", "DOUBLE").mapping(&dialect);

        assert_eq!(mapping.sql_type, "DOUBLE PRECISION");
        assert_eq!(mapping.json_schema, JsonSchema::number().make_nullable());
    }
}
