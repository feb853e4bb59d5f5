//! Flattening mapper between storage rows and archive records.
//!
//! A flattened record is a field-named JSON object containing scalars only;
//! cross-table references appear as bare identifier values. Both directions
//! (row -> record on export, record -> bind parameters on load) are driven by
//! the registry column schema, so no dataset needs a hand-written mapper.

use serde_json::{Map, Value};
use sqlx::query_builder::Separated;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};

use crate::errors::AppError;
use crate::snapshot::registry::{Column, ColumnType, DatasetDef};

/// One flattened row, keyed by column name.
pub type FlatRecord = Map<String, Value>;

/// SELECT statement for exporting a dataset with deterministic ordering.
pub fn select_sql(def: &DatasetDef) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY {}",
        column_list(def),
        def.name,
        def.order_by
    )
}

/// INSERT prefix for loading a dataset; `push_values` appends the tuples.
pub fn insert_prefix(def: &DatasetDef) -> String {
    format!("INSERT INTO {} ({}) ", def.name, column_list(def))
}

fn column_list(def: &DatasetDef) -> String {
    def.columns
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert one storage row into a flattened record.
pub fn flatten_row(def: &DatasetDef, row: &SqliteRow) -> Result<FlatRecord, AppError> {
    let mut record = Map::with_capacity(def.columns.len());
    for col in def.columns {
        let value = match col.ty {
            ColumnType::Id | ColumnType::Integer | ColumnType::Bool => row
                .try_get::<Option<i64>, _>(col.name)?
                .map_or(Value::Null, Value::from),
            ColumnType::Decimal => row
                .try_get::<Option<f64>, _>(col.name)?
                .map_or(Value::Null, Value::from),
            ColumnType::Text | ColumnType::Timestamp | ColumnType::Code => row
                .try_get::<Option<String>, _>(col.name)?
                .map_or(Value::Null, Value::from),
        };
        record.insert(col.name.to_string(), value);
    }
    Ok(record)
}

/// Read the identifier of a flattened record, if the dataset has one.
pub fn record_id(def: &DatasetDef, record: &FlatRecord) -> Option<i64> {
    def.id_column
        .and_then(|c| record.get(c))
        .and_then(Value::as_i64)
}

/// Bind one column of a flattened record into a batched INSERT.
///
/// Values of the wrong JSON type degrade to NULL and are caught by the
/// table's NOT NULL and type constraints during load.
pub fn bind_column<'args>(
    builder: &mut Separated<'_, 'args, Sqlite, &'static str>,
    col: &Column,
    record: &FlatRecord,
) {
    let value = record.get(col.name);
    match col.ty {
        ColumnType::Id | ColumnType::Integer | ColumnType::Bool => {
            builder.push_bind(value.and_then(Value::as_i64));
        }
        ColumnType::Decimal => {
            builder.push_bind(value.and_then(Value::as_f64));
        }
        ColumnType::Text | ColumnType::Timestamp | ColumnType::Code => {
            builder.push_bind(value.and_then(Value::as_str).map(str::to_string));
        }
    }
}

/// Rows per INSERT batch, bounded by SQLite's bind parameter limit.
pub fn batch_rows(def: &DatasetDef) -> usize {
    const MAX_BIND_PARAMS: usize = 800;
    (MAX_BIND_PARAMS / def.columns.len().max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::registry::{dataset, DATASETS};

    #[test]
    fn test_select_sql_shape() {
        let def = dataset("roles").unwrap();
        assert_eq!(select_sql(def), "SELECT id, name FROM roles ORDER BY id");
    }

    #[test]
    fn test_insert_prefix_shape() {
        let def = dataset("roles").unwrap();
        assert_eq!(insert_prefix(def), "INSERT INTO roles (id, name) ");
    }

    #[test]
    fn test_record_id() {
        let def = dataset("orders").unwrap();
        let mut record = FlatRecord::new();
        record.insert("id".to_string(), Value::from(42));
        assert_eq!(record_id(def, &record), Some(42));

        let settings = dataset("settings").unwrap();
        assert_eq!(record_id(settings, &record), None);
    }

    #[test]
    fn test_batch_rows_positive() {
        for def in DATASETS {
            assert!(batch_rows(def) >= 1);
            assert!(batch_rows(def) * def.columns.len() <= 800);
        }
    }
}
