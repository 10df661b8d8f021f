//! Error types for tsingest.
//!
//! Transports report failures as [`ClassifiedError`], tagged with a
//! [`SqlErrorKind`] that drives schema healing. Everything a caller sees is
//! wrapped in the unified [`Error`] enum, whose [`Error::kind`] exposes the
//! public taxonomy.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Result type alias for tsingest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used for wrapped causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Category assigned by a transport to a failed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlErrorKind {
    TableNotExist,
    ColumnNotExist,
    ColumnTypeMismatch,
    DbNotSpecified,
    ConnectionError,
    Other,
}

impl SqlErrorKind {
    /// Whether schema healing knows how to repair this failure.
    pub fn is_repairable(self) -> bool {
        matches!(
            self,
            SqlErrorKind::TableNotExist
                | SqlErrorKind::ColumnNotExist
                | SqlErrorKind::ColumnTypeMismatch
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SqlErrorKind::TableNotExist => "table_not_exist",
            SqlErrorKind::ColumnNotExist => "column_not_exist",
            SqlErrorKind::ColumnTypeMismatch => "column_type_mismatch",
            SqlErrorKind::DbNotSpecified => "db_not_specified",
            SqlErrorKind::ConnectionError => "connection_error",
            SqlErrorKind::Other => "sql_error",
        }
    }
}

impl fmt::Display for SqlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static INVALID_COLUMN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)invalid\s+column\s+name\s*:\s*([A-Za-z0-9_]+)").expect("invalid column regex")
});

static UNKNOWN_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)unknown\s+column\s+'([^']+)'").expect("unknown column regex")
});

static COLUMN_DOES_NOT_EXIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)column\s+does\s+not\s+exist\s*:\s*([A-Za-z0-9_]+)")
        .expect("missing column regex")
});

/// A transport failure tagged with its taxonomy kind.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ClassifiedError {
    kind: SqlErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ClassifiedError {
    pub fn new(kind: SqlErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> SqlErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Best-effort extraction of the missing column named in the message.
    ///
    /// Recognizes:
    /// - `Invalid column name: weather`
    /// - `Unknown column 'weather'`
    /// - `Column does not exist: weather`
    pub fn missing_column_name(&self) -> Option<String> {
        extract_missing_column(&self.message)
    }
}

/// Pull a column name out of a "missing column" style message.
pub fn extract_missing_column(message: &str) -> Option<String> {
    let message = message.trim();
    [&*INVALID_COLUMN_NAME, &*UNKNOWN_COLUMN, &*COLUMN_DOES_NOT_EXIST]
        .iter()
        .find_map(|pattern| pattern.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.trim().is_empty())
}

/// Public error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ConnectionInitFailed,
    NotInitialized,
    ClientClosed,
    TableNotExist,
    ColumnNotExist,
    ColumnTypeMismatch,
    DbNotSpecified,
    ConnectionError,
    GenericSqlError,
    ValueTypeCoercion,
    InsertFailedAfterRetry,
    BatchInsertFailed,
}

impl From<SqlErrorKind> for ErrorKind {
    fn from(kind: SqlErrorKind) -> Self {
        match kind {
            SqlErrorKind::TableNotExist => ErrorKind::TableNotExist,
            SqlErrorKind::ColumnNotExist => ErrorKind::ColumnNotExist,
            SqlErrorKind::ColumnTypeMismatch => ErrorKind::ColumnTypeMismatch,
            SqlErrorKind::DbNotSpecified => ErrorKind::DbNotSpecified,
            SqlErrorKind::ConnectionError => ErrorKind::ConnectionError,
            SqlErrorKind::Other => ErrorKind::GenericSqlError,
        }
    }
}

/// Unified error type for tsingest.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (10-19)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Lifecycle errors (20-29)
    #[error("connection initialization failed: {message}")]
    ConnectionInitFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("client is not initialized: {0}")]
    NotInitialized(String),

    #[error("client is closed")]
    ClientClosed,

    // Statement errors (30-39)
    #[error(transparent)]
    Sql(#[from] ClassifiedError),

    // Value errors (40-49)
    #[error("field '{field}': {message}")]
    ValueTypeCoercion { field: String, message: String },

    // Ingestion errors (50-59)
    #[error("insert into {table} failed after {attempts} attempts")]
    InsertFailedAfterRetry {
        table: String,
        attempts: u32,
        #[source]
        source: ClassifiedError,
    },

    #[error("batch insert failed at record {failed_at} ({inserted} records inserted)")]
    BatchInsertFailed {
        inserted: usize,
        failed_at: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn connection_init(message: impl Into<String>) -> Self {
        Error::ConnectionInitFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::ConnectionInitFailed { .. } => ErrorKind::ConnectionInitFailed,
            Error::NotInitialized(_) => ErrorKind::NotInitialized,
            Error::ClientClosed => ErrorKind::ClientClosed,
            Error::Sql(e) => e.kind().into(),
            Error::ValueTypeCoercion { .. } => ErrorKind::ValueTypeCoercion,
            Error::InsertFailedAfterRetry { .. } => ErrorKind::InsertFailedAfterRetry,
            Error::BatchInsertFailed { .. } => ErrorKind::BatchInsertFailed,
        }
    }

    /// Returns the error code for this error type.
    pub fn code(&self) -> u32 {
        match self.kind() {
            ErrorKind::InvalidInput => 10,
            ErrorKind::ConnectionInitFailed => 20,
            ErrorKind::NotInitialized => 21,
            ErrorKind::ClientClosed => 22,
            ErrorKind::TableNotExist => 30,
            ErrorKind::ColumnNotExist => 31,
            ErrorKind::ColumnTypeMismatch => 32,
            ErrorKind::DbNotSpecified => 33,
            ErrorKind::ConnectionError => 34,
            ErrorKind::GenericSqlError => 35,
            ErrorKind::ValueTypeCoercion => 40,
            ErrorKind::InsertFailedAfterRetry => 50,
            ErrorKind::BatchInsertFailed => 51,
        }
    }

    /// Best-known offending identifier (table, column or field name).
    pub fn identifier(&self) -> Option<String> {
        match self {
            Error::Sql(e) if e.kind() == SqlErrorKind::ColumnNotExist => e.missing_column_name(),
            Error::ValueTypeCoercion { field, .. } => Some(field.clone()),
            Error::InsertFailedAfterRetry { table, source, .. } => {
                if source.kind() == SqlErrorKind::ColumnNotExist {
                    source.missing_column_name().or_else(|| Some(table.clone()))
                } else {
                    Some(table.clone())
                }
            }
            Error::BatchInsertFailed { source, .. } => source.identifier(),
            _ => None,
        }
    }

    /// The classified transport error behind this error, if any.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Error::Sql(e) => Some(e),
            Error::InsertFailedAfterRetry { source, .. } => Some(source),
            Error::BatchInsertFailed { source, .. } => source.classified(),
            _ => None,
        }
    }
}
