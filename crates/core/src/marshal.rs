//! Field-type driven conversion between wire values and local values.
//!
//! The remote store uses `false` for "unset" on every field type, so the read
//! path maps it back to null and the write path maps null to `false`.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::datetime;
use crate::error::CoreError;
use crate::field::{FieldSchema, FieldType, Schema, SelectionOption};
use crate::field_value::FieldValue;
use crate::row::Row;

/// Relational command that replaces the whole id set of a many2many field.
const REPLACE_COMMAND: i64 = 6;

/// Read path. Never fails: unparsable dates come back as null.
pub fn read_value(field: &FieldSchema, raw: &Value) -> FieldValue {
    if field.field_type != FieldType::Boolean && raw.is_boolean() {
        return FieldValue::Null;
    }
    if raw.as_array().is_some_and(Vec::is_empty) {
        return FieldValue::Null;
    }
    match (field.field_type, raw) {
        (FieldType::Date, Value::String(s)) => {
            datetime::parse_date(s).map_or(FieldValue::Null, FieldValue::Date)
        }
        (FieldType::DateTime, Value::String(s)) => {
            datetime::parse_datetime(s).map_or(FieldValue::Null, FieldValue::DateTime)
        }
        _ => FieldValue::from_wire(raw),
    }
}

/// Builds a row from one record returned by a read call.
pub fn read_row(schema: &Arc<Schema>, raw: &Map<String, Value>) -> Row {
    let id = raw.get("id").and_then(Value::as_i64).unwrap_or(0);
    let values = schema
        .iter()
        .filter_map(|field| {
            raw.get(&field.name)
                .map(|value| (field.name.clone(), read_value(field, value)))
        })
        .collect();
    Row::with_values(Arc::clone(schema), id, values)
}

/// Write path.
pub fn write_value(field: &FieldSchema, value: &FieldValue) -> Result<Value, CoreError> {
    if value.is_null() {
        return Ok(match field.field_type {
            FieldType::Many2One => Value::from(0),
            _ => Value::Bool(false),
        });
    }
    match field.field_type {
        FieldType::Boolean => Ok(value.to_wire()),
        FieldType::Float => float_value(field, value).map(|n| {
            serde_json::Number::from_f64(n).map_or(Value::Bool(false), Value::Number)
        }),
        FieldType::Integer => truncated_integer(field, value).map(Value::from),
        FieldType::Many2One | FieldType::One2Many => record_id(field, value).map(Value::from),
        FieldType::Many2Many => {
            let ids = record_ids(field, value)?;
            Ok(Value::Array(vec![Value::Array(vec![
                Value::from(REPLACE_COMMAND),
                Value::from(0),
                Value::Array(ids.into_iter().map(Value::from).collect()),
            ])]))
        }
        FieldType::Date => Ok(Value::String(match value {
            FieldValue::Date(date) => datetime::format_date(*date),
            FieldValue::DateTime(dt) => datetime::format_date(dt.date()),
            other => other.to_string(),
        })),
        FieldType::DateTime => Ok(Value::String(match value {
            FieldValue::DateTime(dt) => datetime::format_datetime(*dt),
            FieldValue::Date(date) => datetime::format_datetime(date.midnight()),
            other => other.to_string(),
        })),
        FieldType::Selection => resolve_selection(field, value)
            .map(|option| Value::String(option.code.clone())),
        FieldType::Char | FieldType::Text | FieldType::Binary => {
            Ok(Value::String(value.to_string()))
        }
    }
}

/// Values to send for a create or write, keyed by field name.
pub fn collect_values(row: &Row, changes_only: bool) -> Result<Map<String, Value>, CoreError> {
    let fields: Vec<&FieldSchema> = if changes_only {
        row.changed_fields()
    } else {
        row.schema().iter().collect()
    };
    let mut values = Map::new();
    for field in fields {
        let value = row.get(&field.name).unwrap_or(&FieldValue::Null);
        values.insert(field.name.clone(), write_value(field, value)?);
    }
    Ok(values)
}

/// Matches `value` against both the stored code and the label of each option.
pub fn resolve_selection<'a>(
    field: &'a FieldSchema,
    value: &FieldValue,
) -> Result<&'a SelectionOption, CoreError> {
    let text = value.to_string();
    field
        .selection_option(&text)
        .ok_or_else(|| CoreError::SelectionMismatch {
            field: field.name.clone(),
            value: text,
        })
}

fn float_value(field: &FieldSchema, value: &FieldValue) -> Result<f64, CoreError> {
    match value {
        FieldValue::Float(n) => Ok(*n),
        FieldValue::Integer(n) => Ok(*n as f64),
        FieldValue::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid_number(field, value)),
        _ => Err(invalid_number(field, value)),
    }
}

/// Goes through a float first so `1.0` and `"1.0"` collapse to `1`. A relation
/// pair `(id, name)` yields its id.
fn truncated_integer(field: &FieldSchema, value: &FieldValue) -> Result<i64, CoreError> {
    match value {
        FieldValue::Integer(n) => Ok(*n),
        FieldValue::Float(n) => Ok(n.trunc() as i64),
        FieldValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(|n| n.trunc() as i64)
            .map_err(|_| invalid_integer(field, value)),
        FieldValue::List(items) => match items.first() {
            Some(first) => truncated_integer(field, first),
            None => Err(invalid_integer(field, value)),
        },
        _ => Err(invalid_integer(field, value)),
    }
}

/// Single record id of a relational value, 0 when unset.
pub fn record_id(field: &FieldSchema, value: &FieldValue) -> Result<i64, CoreError> {
    match value {
        FieldValue::Null => Ok(0),
        other => truncated_integer(field, other),
    }
}

/// Id list of a many2many value given as a list or a comma-separated string.
pub fn record_ids(field: &FieldSchema, value: &FieldValue) -> Result<Vec<i64>, CoreError> {
    match value {
        FieldValue::Null => Ok(Vec::new()),
        FieldValue::List(items) => items
            .iter()
            .map(|item| truncated_integer(field, item))
            .collect(),
        FieldValue::Text(text) => text
            .split(',')
            .filter(|token| !token.trim().is_empty())
            .map(|token| truncated_integer(field, &FieldValue::Text(token.to_string())))
            .collect(),
        other => truncated_integer(field, other).map(|id| vec![id]),
    }
}

fn invalid_number(field: &FieldSchema, value: &FieldValue) -> CoreError {
    CoreError::InvalidNumber {
        field: field.name.clone(),
        value: value.to_string(),
    }
}

fn invalid_integer(field: &FieldSchema, value: &FieldValue) -> CoreError {
    CoreError::InvalidInteger {
        field: field.name.clone(),
        value: value.to_string(),
    }
}
