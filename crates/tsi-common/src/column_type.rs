//! Column type normalization.
//!
//! Callers may declare column types with shorthand tokens (`d`, `s`, `l`…)
//! or with verbose names in any case. Everything downstream (DDL rendering,
//! coercion checks, result typing) works on the canonical form produced here.

use crate::error::{Error, Result};

/// Default length applied to `VARCHAR` / `NCHAR` declared without one.
pub const DEFAULT_TEXT_LENGTH: u32 = 255;

/// Canonicalize a type token.
///
/// Pure and idempotent: `normalize_type(normalize_type(x)) == normalize_type(x)`.
pub fn normalize_type(token: &str) -> Result<String> {
    let raw = token.trim();
    if raw.is_empty() {
        return Err(Error::InvalidInput("column type must not be blank".to_string()));
    }

    let lower = raw.to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "d" | "double" => "DOUBLE".to_string(),
        "f" | "float" => "FLOAT".to_string(),
        "i" | "int" => "INT".to_string(),
        "l" | "long" => "BIGINT".to_string(),
        "t" | "timestamp" => "TIMESTAMP".to_string(),
        "s" | "varchar" => format!("VARCHAR({DEFAULT_TEXT_LENGTH})"),
        "nchar" => format!("NCHAR({DEFAULT_TEXT_LENGTH})"),
        "b" | "bool" | "boolean" => "BOOL".to_string(),
        // varchar(n), nchar(n) and native types keep their spelling, upper-cased
        _ => raw.to_ascii_uppercase(),
    };
    Ok(canonical)
}

/// Base keyword of a type, without any parenthesized length.
pub fn base_type(column_type: &str) -> String {
    let upper = column_type.trim().to_ascii_uppercase();
    match upper.find('(') {
        Some(idx) if idx > 0 => upper[..idx].trim_end().to_string(),
        _ => upper,
    }
}

/// Declared length, if the type carries one (`VARCHAR(64)` → 64).
pub fn type_length(column_type: &str) -> Option<u32> {
    let open = column_type.find('(')?;
    let close = column_type[open..].find(')')? + open;
    column_type[open + 1..close].trim().parse().ok()
}

pub fn is_integer_type(base: &str) -> bool {
    matches!(base, "INT" | "BIGINT" | "SMALLINT" | "TINYINT")
}

/// Integer-looking type names, including the unsigned variants servers report.
pub fn looks_integer(column_type: &str) -> bool {
    let base = base_type(column_type);
    base.contains("INT")
}

pub fn is_float_type(base: &str) -> bool {
    matches!(base, "FLOAT" | "DOUBLE")
}

pub fn looks_float(column_type: &str) -> bool {
    let base = base_type(column_type);
    is_float_type(&base) || base == "DECIMAL" || base == "REAL"
}

pub fn is_bool_type(base: &str) -> bool {
    matches!(base, "BOOL" | "BOOLEAN")
}

pub fn is_text_type(base: &str) -> bool {
    matches!(base, "VARCHAR" | "NCHAR" | "BINARY" | "JSON" | "GEOMETRY")
}

pub fn is_binary_type(base: &str) -> bool {
    matches!(base, "BINARY" | "VARBINARY" | "GEOMETRY")
}
