//! SQL transports.
//!
//! A [`Transport`] executes statements and answers queries, reporting every
//! failure as a [`ClassifiedError`] so the schema healer can react without
//! knowing which wire protocol produced it.

pub mod native;
pub mod pool;
pub mod rest;

use tracing::{debug, enabled, Level};
use tsi_common::{ClassifiedError, QueryResult};

pub use native::{
    classify_driver_error, Driver, DriverColumn, DriverConnection, DriverError, DriverErrorKind,
    DriverRows, NativeTransport, RawCell,
};
pub use pool::{ConnectionPool, PooledConnection};
pub use rest::{RestResponse, RestTransport};

/// Result of a transport call.
pub type SqlResult<T> = std::result::Result<T, ClassifiedError>;

/// A way of sending SQL to the server.
pub trait Transport: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Run a statement whose result set is not needed.
    fn execute(&self, sql: &str) -> SqlResult<()>;

    /// Run a statement and return its rows.
    fn query(&self, sql: &str) -> SqlResult<QueryResult>;

    /// Database used to qualify table names that carry none.
    fn default_database(&self) -> Option<&str>;

    /// Release underlying resources. Must be idempotent.
    fn close(&self) {}
}

/// Log statement text when enabled by config and by the subscriber.
pub(crate) fn log_statement(transport: &str, debug_log: bool, sql: &str) {
    if debug_log && enabled!(Level::DEBUG) {
        debug!(transport, sql_len = sql.chars().count(), sql, "executing statement");
    }
}
