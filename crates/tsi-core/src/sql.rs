//! Statement rendering.
//!
//! Identifiers are emitted as given; value literals follow the declared
//! column type of the field they belong to.

use chrono::SecondsFormat;
use tsi_common::column_type::{is_binary_type, is_bool_type, is_float_type};
use tsi_common::{Field, Table, Value};

const INSERT_PREFIX: &str = "INSERT INTO ";

/// `name TYPE, name TYPE, …` for every field.
pub fn column_definitions(table: &Table) -> String {
    table
        .fields()
        .iter()
        .map(|f| format!("{} {}", f.name(), f.column_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn create_table_sql(table: &Table, default_db: Option<&str>) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.qualified_name(default_db),
        column_definitions(table)
    )
}

/// One row in multi-row INSERT form: `<table> (<cols>) VALUES (<vals>)`.
pub fn insert_fragment(table: &Table, default_db: Option<&str>) -> String {
    let columns = table
        .fields()
        .iter()
        .map(Field::name)
        .collect::<Vec<_>>()
        .join(", ");
    let values = table
        .fields()
        .iter()
        .map(field_literal)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} ({columns}) VALUES ({values})",
        table.qualified_name(default_db)
    )
}

pub fn insert_sql(table: &Table, default_db: Option<&str>) -> String {
    format!("{INSERT_PREFIX}{}", insert_fragment(table, default_db))
}

pub fn add_column_sql(qualified_table: &str, field: &Field) -> String {
    format!(
        "ALTER TABLE {qualified_table} ADD COLUMN {} {}",
        field.name(),
        field.column_type()
    )
}

pub fn drop_column_sql(qualified_table: &str, column: &str) -> String {
    format!("ALTER TABLE {qualified_table} DROP COLUMN {column}")
}

/// Prefix shared by every multi-row statement.
pub fn insert_prefix() -> &'static str {
    INSERT_PREFIX
}

/// Literal for a field's value under its declared type.
pub fn field_literal(field: &Field) -> String {
    literal(field.value(), &field.base_type())
}

/// Render `value` as a SQL literal for a column whose base type is `base`.
pub fn literal(value: &Value, base: &str) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }

    if base == "TIMESTAMP" {
        return match value {
            Value::Int(v) => v.to_string(),
            Value::Timestamp(ts) => quote(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            other => quote(&other.to_string()),
        };
    }

    if is_bool_type(base) {
        let truthy = match value {
            Value::Bool(v) => *v,
            other => {
                let text = other.to_string();
                let text = text.trim();
                text.eq_ignore_ascii_case("true") || text == "1"
            }
        };
        return bool_literal(truthy);
    }

    if base == "VARBINARY" {
        if let Value::Bytes(bytes) = value {
            return format!("'\\x{}'", hex::encode(bytes));
        }
        return quote(&value.to_string());
    }

    if base.contains("INT") || is_float_type(base) || base == "DECIMAL" {
        return match value {
            Value::Int(_) | Value::Float(_) | Value::Decimal(_) => value.to_string(),
            Value::Bool(v) => bool_literal(*v),
            Value::Timestamp(ts) => ts.timestamp_millis().to_string(),
            Value::Text(s) if s.trim().parse::<f64>().is_ok() => s.trim().to_string(),
            other => quote(&other.to_string()),
        };
    }

    match value {
        Value::Timestamp(ts) => quote(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        // bare numbers only for types we know nothing about
        Value::Int(_) | Value::Float(_) | Value::Decimal(_)
            if !is_quoted_type(base) && !is_binary_type(base) =>
        {
            value.to_string()
        }
        other => quote(&other.to_string()),
    }
}

fn bool_literal(value: bool) -> String {
    let digit = if value { "1" } else { "0" };
    digit.to_string()
}

fn is_quoted_type(base: &str) -> bool {
    matches!(base, "VARCHAR" | "NCHAR" | "JSON")
}

/// Single-quote `text`, doubling embedded quotes.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
