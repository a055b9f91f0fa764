//! Column planning and value routing
//!
//! Maps the properties of a batch onto the physical columns of a table. A
//! property keeps using the column created for its type; a value of a new type
//! gets its own column, and the existing unsplit column is renamed so that
//! every column of a split property carries its type suffix:
//!
//! | existing    | batch type | result                    |
//! |-------------|------------|---------------------------|
//! | -           | string     | `name`                    |
//! | `name` (s)  | string     | `name`                    |
//! | `name` (s)  | boolean    | `name__s`, `name__b`      |
//! | -           | [int, str] | `name__i`, `name__s`      |
//!
//! Names that collide with a column of another property get a numeric suffix
//! (`name__1`, `name__2`, ...).

use chrono::DateTime;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::dialect::WarehouseDialect;
use crate::lifecycle::DesiredColumn;
use crate::models::{
    ColumnMapping, JsonSchema, JsonType, Row, TableJsonSchema, TableSchema,
};
use crate::validation::{IdentifierPolicy, ValidationError, ValidationResult, suffixed_identifier};

/// A schema change needed before the batch can be loaded
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnAction {
    Rename { from: String, to: String },
    Add(DesiredColumn),
}

/// Physical column of a property, with the single type it stores
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub column: String,
    pub schema: JsonSchema,
}

/// Schema changes plus the per-property routing of values
#[derive(Debug, Clone, Default)]
pub struct ColumnPlan {
    pub actions: Vec<ColumnAction>,
    routes: BTreeMap<String, Vec<Route>>,
}

impl ColumnPlan {
    /// Columns a property's values may go to
    pub fn routes(&self, property: &str) -> &[Route] {
        self.routes.get(property).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The only column of a property, if it has exactly one
    pub fn single_column(&self, property: &str) -> Option<&str> {
        match self.routes(property) {
            [route] => Some(route.column.as_str()),
            _ => None,
        }
    }

    /// Rewrite a batch row keyed by physical column
    pub fn route_row(&self, stream: &str, index: usize, row: &Row) -> ValidationResult<Row> {
        let mut routed = Row::new();

        for (property, routes) in &self.routes {
            let Some(value) = row.get(property).filter(|v| !v.is_null()) else {
                continue;
            };

            let (column, value) = route_value(value, routes).ok_or_else(|| {
                ValidationError::ValueTypeMismatch {
                    stream: stream.to_string(),
                    property: property.clone(),
                    row: index,
                    found: value_type_name(value).to_string(),
                    expected: routes
                        .iter()
                        .flat_map(|r| r.schema.non_null_types())
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(" or "),
                }
            })?;
            routed.insert(column, value);
        }

        Ok(routed)
    }
}

/// One single-type schema per non-null type of `schema`
fn split_types(schema: &JsonSchema) -> Vec<JsonSchema> {
    schema
        .non_null_types()
        .into_iter()
        .map(|t| {
            let mut single = JsonSchema::new(vec![t]);
            if t == JsonType::String {
                single.format = schema.format.clone();
                single.max_length = schema.max_length;
            }
            single
        })
        .collect()
}

/// `base`, or `base__N` for the first N that is not taken
fn unique_column_name(
    table: &TableSchema,
    base: String,
    policy: &IdentifierPolicy,
) -> ValidationResult<String> {
    if !table.has_column(&base) {
        return Ok(base);
    }

    let mut n = 1;
    loop {
        let candidate = suffixed_identifier(&base, &n.to_string(), "column name", policy)?;
        if !table.has_column(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Plan the columns needed to load rows of `schema` into `table`
///
/// `table` is not modified; the plan's actions are applied by the caller.
pub fn plan_columns(
    table: &TableSchema,
    schema: &TableJsonSchema,
    dialect: &dyn WarehouseDialect,
    policy: &IdentifierPolicy,
) -> ValidationResult<ColumnPlan> {
    let mut projected = table.clone();
    let mut plan = ColumnPlan::default();
    let mut wanted: Vec<(String, JsonSchema)> = Vec::new();

    for (property, property_schema) in &schema.properties {
        let singles = split_types(property_schema);
        if singles.is_empty() {
            continue;
        }

        let canonical = dialect.canonicalize_identifier(property, "column name", policy)?;
        let split = singles.len() > 1;

        for single in singles {
            if projected.column_for(property, &single).is_some() {
                wanted.push((property.clone(), single));
                continue;
            }

            let existing: Vec<(String, JsonSchema)> = projected
                .columns_from(property)
                .map(|(column, mapping)| (column.to_string(), mapping.json_schema.clone()))
                .collect();

            let name = if existing.is_empty() && !split {
                unique_column_name(&projected, canonical.clone(), policy)?
            } else {
                // The unsplit column moves aside under its own type suffix
                if let Some((column, column_schema)) =
                    existing.iter().find(|(column, _)| *column == canonical)
                {
                    let renamed = suffixed_identifier(
                        &canonical,
                        &column_schema.shorthand(),
                        "column name",
                        policy,
                    )?;
                    let renamed = unique_column_name(&projected, renamed, policy)?;
                    projected.rename_mapping(column, renamed.clone());
                    plan.actions.push(ColumnAction::Rename {
                        from: column.clone(),
                        to: renamed,
                    });
                }

                let suffixed =
                    suffixed_identifier(&canonical, &single.shorthand(), "column name", policy)?;
                unique_column_name(&projected, suffixed, policy)?
            };

            let nullable = single.make_nullable();
            projected.add_mapping(
                name.clone(),
                ColumnMapping::new(dialect.to_native_type(&nullable), nullable.clone(), property.clone()),
            );
            plan.actions
                .push(ColumnAction::Add(DesiredColumn::new(name, property.clone(), nullable)));
            wanted.push((property.clone(), single));
        }
    }

    // Routes are resolved last so that renames made for later types are seen
    for (property, single) in wanted {
        if let Some(column) = projected.column_for(&property, &single) {
            plan.routes.entry(property).or_default().push(Route {
                column: column.to_string(),
                schema: single,
            });
        }
    }

    Ok(plan)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Column shorthands a value may go to, most specific first
fn candidate_shorthands(value: &Value) -> &'static [&'static str] {
    match value {
        Value::Null => &[],
        Value::Bool(_) => &["b"],
        Value::Number(n) if n.is_i64() || n.is_u64() => &["i", "f"],
        Value::Number(n) if n.as_f64().is_some_and(|f| f.fract() == 0.0) => &["f", "i"],
        Value::Number(_) => &["f"],
        Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => &["t", "s"],
        Value::String(_) => &["s", "t"],
        Value::Array(_) => &["a", "s"],
        Value::Object(_) => &["o", "s"],
    }
}

fn route_value(value: &Value, routes: &[Route]) -> Option<(String, Value)> {
    for shorthand in candidate_shorthands(value) {
        if let Some(route) = routes.iter().find(|r| r.schema.shorthand() == *shorthand) {
            let value = match (*shorthand, value) {
                // Whole floats stored in an integer column
                ("i", Value::Number(n)) if !(n.is_i64() || n.is_u64()) => {
                    n.as_f64().map(|f| Value::from(f as i64))?
                }
                _ => value.clone(),
            };
            return Some((route.column.clone(), value));
        }
    }
    None
}
