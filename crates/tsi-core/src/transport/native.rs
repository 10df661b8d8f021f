//! Native-driver transport.
//!
//! The driver library itself lives outside this crate; it is plugged in
//! through [`Driver`] and [`DriverConnection`]. Connections are borrowed from a
//! [`ConnectionPool`] for the duration of one statement.

use super::pool::ConnectionPool;
use super::{log_statement, SqlResult, Transport};
use crate::normalize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use tsi_common::{ClassifiedError, Error, QueryResult, Result, SqlErrorKind};
use tsi_config::ClientConfig;

/// Broad category of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Could not reach the server, or the session was lost.
    Connection,
    /// The server rejected the statement.
    Statement,
}

/// Error reported by a driver.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub code: Option<i32>,
    pub message: String,
}

impl DriverError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Connection,
            code: None,
            message: message.into(),
        }
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Statement,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

/// Column description reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverColumn {
    pub name: String,
    /// Type name as the driver spells it (`TIMESTAMP`, `NCHAR`, `INT UNSIGNED`…).
    pub type_name: String,
    pub length: Option<u32>,
}

impl DriverColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, length: Option<u32>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            length,
        }
    }
}

/// A cell as the driver hands it over, before typing by column.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Rows returned by a driver query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverRows {
    pub columns: Vec<DriverColumn>,
    pub rows: Vec<Vec<RawCell>>,
    pub affected_rows: Option<i64>,
}

/// Opens sessions against the server.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str {
        "driver"
    }

    fn connect(
        &self,
        dsn: &str,
        user: &str,
        password: &str,
    ) -> std::result::Result<Box<dyn DriverConnection>, DriverError>;
}

/// One server session. Never used by two callers at once.
pub trait DriverConnection: Send {
    fn execute(&mut self, sql: &str) -> std::result::Result<(), DriverError>;
    fn query(&mut self, sql: &str) -> std::result::Result<DriverRows, DriverError>;
    fn is_closed(&self) -> bool;
    fn close(&mut self);
}

/// Classify a driver failure by its kind and message text.
pub fn classify_driver_error(err: DriverError) -> ClassifiedError {
    let kind = if err.kind == DriverErrorKind::Connection {
        SqlErrorKind::ConnectionError
    } else {
        let message = err.message.to_lowercase();
        if message.contains("table does not exist") {
            SqlErrorKind::TableNotExist
        } else if message.contains("column does not exist")
            || message.contains("invalid column name")
            || message.contains("unknown column")
        {
            SqlErrorKind::ColumnNotExist
        } else if message.contains("type mismatch") {
            SqlErrorKind::ColumnTypeMismatch
        } else if message.contains("db is not specified") || message.contains("database not specified") {
            SqlErrorKind::DbNotSpecified
        } else {
            SqlErrorKind::Other
        }
    };
    ClassifiedError::new(kind, err.message.clone()).with_source(err)
}

pub struct NativeTransport {
    pool: ConnectionPool,
    database: Option<String>,
    decode_binary_as_text: bool,
    debug_log: bool,
}

impl NativeTransport {
    /// Build the pool and verify the server is reachable.
    pub fn connect(
        driver: Arc<dyn Driver>,
        dsn: &str,
        user: &str,
        password: &str,
        database: Option<String>,
        config: &ClientConfig,
    ) -> Result<Self> {
        if dsn.trim().is_empty() {
            return Err(Error::InvalidInput("connection url must not be blank".to_string()));
        }
        if user.trim().is_empty() {
            return Err(Error::InvalidInput("user must not be blank".to_string()));
        }

        let driver_name = driver.name().to_string();
        let pool = ConnectionPool::new(driver, dsn, user, password, config.pool_max_idle);

        // connection test; the session goes straight back to the idle list
        match pool.acquire() {
            Ok(conn) => drop(conn),
            Err(e) => {
                warn!(driver = %driver_name, error = %e, "native connection test failed");
                return Err(Error::ConnectionInitFailed {
                    message: format!("{driver_name} could not connect: {}", e.message()),
                    source: Some(e.into()),
                });
            }
        }

        debug!(driver = %driver_name, database = ?database, "native transport ready");
        Ok(Self {
            pool,
            database,
            decode_binary_as_text: config.decode_binary_as_text,
            debug_log: config.debug_log,
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl Transport for NativeTransport {
    fn name(&self) -> &'static str {
        "native"
    }

    fn execute(&self, sql: &str) -> SqlResult<()> {
        log_statement(self.name(), self.debug_log, sql);
        let mut conn = self.pool.acquire()?;
        conn.execute(sql).map_err(classify_driver_error)
    }

    fn query(&self, sql: &str) -> SqlResult<QueryResult> {
        log_statement(self.name(), self.debug_log, sql);
        let mut conn = self.pool.acquire()?;
        let rows = conn.query(sql).map_err(classify_driver_error)?;
        Ok(normalize::from_native(rows, self.decode_binary_as_text))
    }

    fn default_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn close(&self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_win_over_text() {
        let err = classify_driver_error(DriverError::connection("table does not exist"));
        assert_eq!(err.kind(), SqlErrorKind::ConnectionError);
    }

    #[test]
    fn schema_phrases() {
        let cases = [
            ("Table does not exist", SqlErrorKind::TableNotExist),
            ("Column does not exist: volt", SqlErrorKind::ColumnNotExist),
            ("Invalid column name: volt", SqlErrorKind::ColumnNotExist),
            ("Data type mismatch", SqlErrorKind::ColumnTypeMismatch),
            ("Syntax error in SQL", SqlErrorKind::Other),
        ];
        for (message, expected) in cases {
            let err = classify_driver_error(DriverError::statement(message));
            assert_eq!(err.kind(), expected, "{message}");
            assert_eq!(err.message(), message);
        }
    }

    #[test]
    fn classifiers_agree_across_transports() {
        let messages = [
            "Table does not exist",
            "Column does not exist: volt",
            "Invalid column name: volt",
            "Unknown column 'volt' in field list",
            "Data type mismatch",
            "db is not specified",
            "Database not specified",
            "Syntax error in SQL",
        ];
        for message in messages {
            let native = classify_driver_error(DriverError::statement(message)).kind();
            assert_eq!(crate::transport::rest::classify(None, message), native, "{message}");
        }
    }

    #[test]
    fn code_is_kept() {
        let err = DriverError::statement("boom").with_code(0x2662);
        assert_eq!(err.code, Some(0x2662));
    }
}
