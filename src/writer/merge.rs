//! Merge statements
//!
//! Rows are bulk-loaded into a temporary table first and then merged into the
//! destination in two statements. Temp rows are ranked per key (plus nesting
//! subkeys) by sequence, keeping only the rows carrying the highest sequence of
//! their key. Destination rows whose key appears with an equal or higher
//! sequence are deleted, then every ranked row whose key is absent from the
//! destination is inserted. A lower sequence therefore never overwrites a
//! higher one, and replaying a batch leaves the destination unchanged.

use crate::dialect::WarehouseDialect;

const RANK_COLUMN: &str = "_sdc_row_rank";
const MAX_SEQUENCE_COLUMN: &str = "_sdc_max_sequence";

/// SQL to move the rows of a temp table into its destination
pub struct MergeStatements<'a> {
    dialect: &'a dyn WarehouseDialect,
    /// Qualified destination table
    target: String,
    /// Destination table name, for qualifying its columns
    target_ref: String,
    /// Quoted temp table
    temp: String,
    /// Physical columns copied, in order
    columns: &'a [String],
    /// Physical key columns
    keys: Vec<String>,
    /// Physical nesting ordinal columns
    subkeys: Vec<String>,
    /// Physical sequence column
    sequence: String,
}

impl<'a> MergeStatements<'a> {
    pub fn new(
        dialect: &'a dyn WarehouseDialect,
        schema: &str,
        table: &str,
        temp: String,
        columns: &'a [String],
        sequence: impl Into<String>,
    ) -> Self {
        Self {
            dialect,
            target: dialect.qualified_name(schema, table),
            target_ref: dialect.quote_identifier(table),
            temp,
            columns,
            keys: Vec::new(),
            subkeys: Vec::new(),
            sequence: sequence.into(),
        }
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_subkeys(mut self, subkeys: Vec<String>) -> Self {
        self.subkeys = subkeys;
        self
    }

    /// Whether rows are upserted by key rather than appended
    pub fn is_keyed(&self) -> bool {
        !self.keys.is_empty()
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn quoted_list(&self, names: &[String], alias: Option<&str>) -> String {
        names
            .iter()
            .map(|name| match alias {
                Some(alias) => format!("{}.{}", alias, self.quote(name)),
                None => self.quote(name),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn join_condition(&self, names: &[String], left: &str, right: &str) -> String {
        names
            .iter()
            .map(|name| {
                let quoted = self.quote(name);
                format!("{}.{} = {}.{}", left, quoted, right, quoted)
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Temp rows of the highest sequence per key, one per key and subkeys
    pub fn dedupped_sql(&self) -> String {
        let mut partition = self.keys.clone();
        partition.extend(self.subkeys.iter().cloned());

        let sequence = self.quote(&self.sequence);
        let rank = self.quote(RANK_COLUMN);
        let max_sequence = self.quote(MAX_SEQUENCE_COLUMN);

        format!(
            "SELECT * FROM (SELECT *, ROW_NUMBER() OVER (PARTITION BY {} ORDER BY {} DESC) AS {}, \
             MAX({}) OVER (PARTITION BY {}) AS {} FROM {}) AS ranked \
             WHERE ranked.{} = 1 AND ranked.{} = ranked.{}",
            self.quoted_list(&partition, None),
            sequence,
            rank,
            sequence,
            self.quoted_list(&self.keys, None),
            max_sequence,
            self.temp,
            rank,
            sequence,
            max_sequence
        )
    }

    /// Delete destination rows superseded by the batch
    pub fn delete_sql(&self) -> String {
        let sequence = self.quote(&self.sequence);
        format!(
            "DELETE FROM {target} USING ({dedupped}) AS pks WHERE {keys} \
             AND ({target_ref}.{sequence} IS NULL OR pks.{sequence} >= {target_ref}.{sequence})",
            target = self.target,
            target_ref = self.target_ref,
            dedupped = self.dedupped_sql(),
            keys = self.join_condition(&self.keys, &self.target_ref, "pks"),
            sequence = sequence,
        )
    }

    /// Insert ranked rows whose key is not (or no longer) in the destination
    pub fn insert_sql(&self) -> String {
        let mut join_columns = self.keys.clone();
        join_columns.extend(self.subkeys.iter().cloned());

        let first_key = self
            .keys
            .first()
            .map(|key| self.quote(key))
            .unwrap_or_default();

        format!(
            "INSERT INTO {} ({}) SELECT {} FROM ({}) AS pks LEFT JOIN {} AS tgt ON {} WHERE tgt.{} IS NULL",
            self.target,
            self.quoted_list(self.columns, None),
            self.quoted_list(self.columns, Some("pks")),
            self.dedupped_sql(),
            self.target,
            self.join_condition(&join_columns, "pks", "tgt"),
            first_key
        )
    }

    /// Append every temp row (tables without key properties)
    pub fn append_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            self.target,
            self.quoted_list(self.columns, None),
            self.quoted_list(self.columns, None),
            self.temp
        )
    }

    /// Statements to run in order
    pub fn statements(&self) -> Vec<String> {
        if self.is_keyed() {
            vec![self.delete_sql(), self.insert_sql()]
        } else {
            vec![self.append_sql()]
        }
    }

    pub fn drop_temp_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.temp)
    }
}
