use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Statement;
use rusqlite::types::ValueRef;

use crate::results::{ColumnMetadata, ResultTable, Row};
use crate::types::{ColumnType, Value};

use super::DATE_FORMATS;
use super::params::BindValues;

/// Row buffer reservation when no prefetch hint is set.
const DEFAULT_ROW_CAPACITY: usize = 10;

/// Map a declared column type to a type tag using `SQLite`'s affinity rules.
///
/// Returns `None` for expression columns and NUMERIC-affinity declarations, whose tag is taken
/// from the first non-null value instead.
pub(crate) fn column_type_from_decl(decl: Option<&str>) -> Option<ColumnType> {
    let decl = decl?.to_ascii_uppercase();
    if decl.contains("DATE") || decl.contains("TIME") {
        Some(ColumnType::Date)
    } else if decl.contains("INT") {
        Some(ColumnType::Integer)
    } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
        Some(ColumnType::String)
    } else if decl.contains("BLOB") {
        Some(ColumnType::Binary)
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        Some(ColumnType::Float)
    } else {
        None
    }
}

fn column_type_from_value(value: ValueRef<'_>) -> Option<ColumnType> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(_) => Some(ColumnType::Integer),
        ValueRef::Real(_) => Some(ColumnType::Float),
        ValueRef::Text(_) => Some(ColumnType::String),
        ValueRef::Blob(_) => Some(ColumnType::Binary),
    }
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Convert one native column value, guided by the column's type tag.
pub(crate) fn value_from_native(value: ValueRef<'_>, column_type: ColumnType) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match column_type {
            ColumnType::Float => Value::Float(i as f64),
            _ => Value::Integer(i),
        },
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if column_type == ColumnType::Date {
                if let Some(dt) = parse_date(&text) {
                    return Value::Date(dt);
                }
            }
            Value::String(text.into_owned())
        }
        ValueRef::Blob(bytes) => Value::Binary(bytes.to_vec()),
    }
}

/// Run a result-producing statement and fetch every row into a [`ResultTable`].
///
/// Column metadata is computed once; undeclared columns take their tag from the first non-null
/// value seen in that column, widening from `Integer` to `Float` if a REAL turns up later so
/// every row matches its column's tag. The prefetch hint sizes the row buffer.
///
/// # Errors
/// Returns the native error raised while stepping the statement or reading a column.
pub fn build_result_table(
    stmt: &mut Statement<'_>,
    binds: &BindValues,
    prefetch_rows: Option<usize>,
) -> Result<ResultTable, rusqlite::Error> {
    let declared: Vec<(String, Option<ColumnType>)> = stmt
        .columns()
        .iter()
        .map(|column| (column.name().to_owned(), column_type_from_decl(column.decl_type())))
        .collect();
    let mut resolved: Vec<Option<ColumnType>> = declared.iter().map(|(_, tag)| *tag).collect();
    let inferred: Vec<bool> = resolved.iter().map(Option::is_none).collect();
    let mut widened = vec![false; resolved.len()];
    let col_count = declared.len();

    let mut rows_iter = stmt.query(rusqlite::params_from_iter(binds.as_values()))?;
    let mut fetched: Vec<Vec<Value>> =
        Vec::with_capacity(prefetch_rows.unwrap_or(DEFAULT_ROW_CAPACITY));

    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(col_count);
        for (idx, slot) in resolved.iter_mut().enumerate() {
            let raw = row.get_ref(idx)?;
            match (*slot, raw) {
                (None, _) => *slot = column_type_from_value(raw),
                (Some(ColumnType::Integer), ValueRef::Real(_)) if inferred[idx] => {
                    *slot = Some(ColumnType::Float);
                    widened[idx] = true;
                }
                _ => {}
            }
            values.push(value_from_native(raw, slot.unwrap_or(ColumnType::Null)));
        }
        fetched.push(values);
    }
    drop(rows_iter);

    // Integers fetched before a REAL showed up in a widened column.
    if widened.contains(&true) {
        for values in &mut fetched {
            for (value, _) in values.iter_mut().zip(&widened).filter(|(_, w)| **w) {
                if let Value::Integer(i) = *value {
                    *value = Value::Float(i as f64);
                }
            }
        }
    }
    let rows: Vec<Row> = fetched.into_iter().map(Row::new).collect();

    let columns = declared
        .into_iter()
        .zip(resolved)
        .enumerate()
        .map(|(ordinal, ((name, _), tag))| ColumnMetadata {
            name,
            column_type: tag.unwrap_or(ColumnType::Null),
            ordinal,
        })
        .collect();

    Ok(ResultTable::new(columns, rows))
}
