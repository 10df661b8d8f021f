//! Value/type coercion detection.
//!
//! The server silently converts a value that does not match its column type
//! (a fractional number into an `INT` column is truncated, an unrecognized
//! string into a `BOOL` column becomes 0). The detector flags those cases
//! before the statement is sent, either as a logged warning or, in strict
//! mode, as a [`Error::ValueTypeCoercion`].

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use tsi_common::column_type::{is_bool_type, is_integer_type};
use tsi_common::{Error, Field, Result, Table, Value};

/// What the server would do with the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Fractional part dropped by an integer column.
    PossibleTruncation,
    /// Non-boolean value stored as 0 by a boolean column.
    PossibleBoolCoercion,
}

impl WarningKind {
    pub fn describe(self) -> &'static str {
        match self {
            WarningKind::PossibleTruncation => "possible truncation",
            WarningKind::PossibleBoolCoercion => "possible coercion to 0",
        }
    }
}

/// A single flagged field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoercionWarning {
    pub field: String,
    pub column_type: String,
    pub value: String,
    pub kind: WarningKind,
}

impl fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} value {} for {} column {}",
            self.kind.describe(),
            self.value,
            self.column_type,
            self.field
        )
    }
}

impl From<CoercionWarning> for Error {
    fn from(warning: CoercionWarning) -> Self {
        Error::ValueTypeCoercion {
            message: warning.to_string(),
            field: warning.field,
        }
    }
}

/// Check one field against its declared type.
pub fn check(field: &Field) -> Option<CoercionWarning> {
    let value = field.value();
    if value.is_null() {
        return None;
    }

    let base = field.base_type();
    let kind = if is_integer_type(&base) && has_fraction(value) {
        WarningKind::PossibleTruncation
    } else if is_bool_type(&base) && !is_boolean_like(value) {
        WarningKind::PossibleBoolCoercion
    } else {
        return None;
    };

    Some(CoercionWarning {
        field: field.name().to_string(),
        column_type: field.column_type().to_string(),
        value: value.to_string(),
        kind,
    })
}

fn has_fraction(value: &Value) -> bool {
    match value {
        Value::Float(v) => v.fract() != 0.0,
        Value::Decimal(d) => d.normalize().scale() > 0,
        _ => false,
    }
}

fn is_boolean_like(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        other => matches!(
            other.to_string().trim().to_lowercase().as_str(),
            "true" | "false" | "1" | "0"
        ),
    }
}

/// Runs [`check`] over whole tables, honoring a shared strict-mode toggle.
///
/// The toggle is an `Arc<AtomicBool>` so every clone of a client (and any
/// thread holding the handle) sees updates on its next inspection. Loads and
/// stores are relaxed; an inspection already in progress is not affected.
#[derive(Debug, Clone, Default)]
pub struct CoercionDetector {
    strict: Arc<AtomicBool>,
}

impl CoercionDetector {
    pub fn new(strict: bool) -> Self {
        Self {
            strict: Arc::new(AtomicBool::new(strict)),
        }
    }

    /// Share an existing toggle.
    pub fn with_handle(strict: Arc<AtomicBool>) -> Self {
        Self { strict }
    }

    pub fn handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.strict)
    }

    pub fn set_strict(&self, enabled: bool) {
        self.strict.store(enabled, Ordering::Relaxed);
    }

    pub fn is_strict(&self) -> bool {
        self.strict.load(Ordering::Relaxed)
    }

    /// Inspect every field of `table`.
    ///
    /// Non-strict: warnings are logged and returned. Strict: the first
    /// warning is returned as [`Error::ValueTypeCoercion`].
    pub fn inspect(&self, table: &Table) -> Result<Vec<CoercionWarning>> {
        let strict = self.is_strict();
        let mut warnings = Vec::new();

        for field in table.fields() {
            let Some(warning) = check(field) else {
                continue;
            };
            if strict {
                return Err(warning.into());
            }
            warn!(
                table = %table.full_name(),
                field = %warning.field,
                column_type = %warning.column_type,
                value = %warning.value,
                "{}",
                warning.kind.describe()
            );
            warnings.push(warning);
        }

        Ok(warnings)
    }
}
