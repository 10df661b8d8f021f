//! Conversion of transport responses into [`QueryResult`].
//!
//! Both converters are total: malformed metadata gets synthetic names and a
//! cell that cannot be read as its declared type is kept in its raw string
//! form.

use crate::transport::{DriverRows, RawCell, RestResponse};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use tsi_common::column_type::{base_type, is_binary_type, is_bool_type, looks_float, looks_integer};
use tsi_common::{ColumnMeta, QueryResult, Value};

/// Type names for the numeric codes older servers put in `column_meta`.
pub fn type_name_for_code(code: i64) -> Option<&'static str> {
    let name = match code {
        0 => "NULL",
        1 => "BOOL",
        2 => "TINYINT",
        3 => "SMALLINT",
        4 => "INT",
        5 => "BIGINT",
        6 => "FLOAT",
        7 => "DOUBLE",
        8 => "VARCHAR",
        9 => "TIMESTAMP",
        10 => "NCHAR",
        11 => "TINYINT UNSIGNED",
        12 => "SMALLINT UNSIGNED",
        13 => "INT UNSIGNED",
        14 => "BIGINT UNSIGNED",
        15 => "JSON",
        16 => "VARBINARY",
        17 => "DECIMAL",
        20 => "GEOMETRY",
        _ => return None,
    };
    Some(name)
}

/// Build a result from a REST response body.
pub fn from_rest(response: &RestResponse) -> QueryResult {
    let columns: Vec<ColumnMeta> = response
        .column_meta
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, entry)| rest_column(i, entry))
        .collect();

    let rows: Vec<Vec<Value>> = response
        .data
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|row| {
            let cells: &[Json] = match row {
                Json::Array(cells) => cells,
                single => std::slice::from_ref(single),
            };
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let declared = columns.get(i).map(|c| c.column_type.as_str());
                    rest_cell(cell, declared)
                })
                .collect()
        })
        .collect();

    QueryResult::new(columns, rows, response.rows)
}

fn rest_column(index: usize, entry: &Json) -> ColumnMeta {
    let synthetic = || format!("col{index}");
    match entry {
        Json::Array(parts) => {
            let name = parts
                .first()
                .and_then(Json::as_str)
                .map(str::to_string)
                .unwrap_or_else(synthetic);
            let column_type = parts.get(1).map(rest_type).unwrap_or_default();
            let length = parts.get(2).and_then(json_u32);
            ColumnMeta::new(name, column_type, length)
        }
        Json::Object(map) => {
            let name = map
                .get("name")
                .and_then(Json::as_str)
                .map(str::to_string)
                .unwrap_or_else(synthetic);
            let column_type = map.get("type").map(rest_type).unwrap_or_default();
            let length = map.get("length").and_then(json_u32);
            ColumnMeta::new(name, column_type, length)
        }
        _ => ColumnMeta::new(synthetic(), String::new(), None),
    }
}

fn rest_type(raw: &Json) -> String {
    match raw {
        Json::String(name) => name.trim().to_ascii_uppercase(),
        Json::Number(n) => n
            .as_i64()
            .and_then(type_name_for_code)
            .map(str::to_string)
            .unwrap_or_else(|| n.to_string()),
        _ => String::new(),
    }
}

fn json_u32(raw: &Json) -> Option<u32> {
    raw.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn rest_cell(cell: &Json, declared: Option<&str>) -> Value {
    let declared = declared.filter(|t| !t.is_empty());
    match cell {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match declared {
            Some(ty) if is_bool_type(&base_type(ty)) => Value::Bool(n.as_f64() == Some(1.0)),
            Some(ty) if base_type(ty) == "TIMESTAMP" => match n.as_i64() {
                Some(ms) => Value::timestamp_millis(ms),
                None => Value::Text(n.to_string()),
            },
            Some(ty) if looks_float(ty) => n.as_f64().map(Value::Float).unwrap_or_else(|| Value::Text(n.to_string())),
            Some(ty) if looks_integer(ty) => integer_or_raw(n),
            _ => match n.as_i64() {
                Some(v) => Value::Int(v),
                None => integer_or_raw(n),
            },
        },
        Json::String(s) => match declared {
            Some(ty) => text_as(s, ty),
            None => Value::Text(s.clone()),
        },
        other => Value::Text(other.to_string()),
    }
}

fn integer_or_raw(n: &serde_json::Number) -> Value {
    if let Some(v) = n.as_i64() {
        return Value::Int(v);
    }
    // unsigned values above i64::MAX and anything fractional
    match n.as_f64() {
        Some(v) if !n.is_u64() => Value::Float(v),
        _ => Value::Text(n.to_string()),
    }
}

/// Read a textual cell as the declared type, keeping the text on failure.
fn text_as(raw: &str, column_type: &str) -> Value {
    let base = base_type(column_type);
    let trimmed = raw.trim();
    let parsed = if is_bool_type(&base) {
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        }
    } else if base == "TIMESTAMP" {
        parse_timestamp(trimmed)
    } else if looks_float(column_type) {
        trimmed.parse::<f64>().ok().map(Value::Float)
    } else if looks_integer(column_type) {
        trimmed.parse::<i64>().ok().map(Value::Int)
    } else {
        None
    };
    parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
}

fn parse_timestamp(raw: &str) -> Option<Value> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(Value::Timestamp(ts.with_timezone(&Utc)));
    }
    // "2024-01-01 00:00:00.000" without an offset is UTC
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| Value::Timestamp(naive.and_utc()))
}

/// Build a result from driver rows.
pub fn from_native(rows: DriverRows, decode_binary_as_text: bool) -> QueryResult {
    let columns: Vec<ColumnMeta> = rows
        .columns
        .into_iter()
        .map(|c| ColumnMeta::new(c.name, c.type_name.trim().to_ascii_uppercase(), c.length))
        .collect();

    let values: Vec<Vec<Value>> = rows
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(i, cell)| {
                    let declared = columns.get(i).map(|c| c.column_type.as_str()).unwrap_or("");
                    native_cell(cell, declared, decode_binary_as_text)
                })
                .collect()
        })
        .collect();

    QueryResult::new(columns, values, rows.affected_rows)
}

fn native_cell(cell: RawCell, column_type: &str, decode_binary_as_text: bool) -> Value {
    if cell == RawCell::Null {
        return Value::Null;
    }
    let base = base_type(column_type);

    if is_bool_type(&base) {
        return match cell {
            RawCell::Bool(b) => Value::Bool(b),
            RawCell::Int(v) => Value::Bool(v != 0),
            RawCell::UInt(v) => Value::Bool(v != 0),
            RawCell::Text(s) => text_as(&s, column_type),
            other => raw_value(other),
        };
    }

    if base == "TIMESTAMP" {
        return match cell {
            RawCell::Int(ms) => Value::timestamp_millis(ms),
            RawCell::Text(s) => parse_timestamp(s.trim()).unwrap_or(Value::Text(s)),
            other => raw_value(other),
        };
    }

    if looks_float(column_type) {
        return match cell {
            RawCell::Float(v) => Value::Float(v),
            RawCell::Int(v) => Value::Float(v as f64),
            RawCell::UInt(v) => Value::Float(v as f64),
            RawCell::Text(s) => text_as(&s, column_type),
            other => raw_value(other),
        };
    }

    if looks_integer(column_type) {
        return match cell {
            RawCell::Int(v) => Value::Int(v),
            RawCell::Text(s) => text_as(&s, column_type),
            other => raw_value(other),
        };
    }

    if is_binary_type(&base) {
        return match cell {
            RawCell::Bytes(bytes) if decode_binary_as_text => Value::Text(text_until_nul(&bytes)),
            other => raw_value(other),
        };
    }

    match cell {
        // VARCHAR, NCHAR, JSON
        RawCell::Bytes(bytes) if matches!(base.as_str(), "VARCHAR" | "NCHAR" | "JSON") => {
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        other => raw_value(other),
    }
}

fn raw_value(cell: RawCell) -> Value {
    match cell {
        RawCell::Null => Value::Null,
        RawCell::Bool(b) => Value::Bool(b),
        RawCell::Int(v) => Value::Int(v),
        RawCell::UInt(v) => match i64::try_from(v) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::Text(v.to_string()),
        },
        RawCell::Float(v) => Value::Float(v),
        RawCell::Text(s) => Value::Text(s),
        RawCell::Bytes(b) => Value::Bytes(b),
    }
}

fn text_until_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
