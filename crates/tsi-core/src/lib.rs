//! tsingest core: the adaptive ingestion pipeline.
//!
//! This crate provides:
//! - Coercion checks of values against declared column types
//! - SQL rendering for inserts and schema repairs
//! - REST and native-driver transports with classified failures
//! - Schema healing (create table, add columns, rebuild mismatched columns)
//! - Length-bounded multi-row batching with per-row degradation
//! - The [`Client`] tying it all together

pub mod batch;
pub mod client;
pub mod coercion;
pub mod heal;
pub mod logging;
pub mod normalize;
pub mod sql;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use batch::{BatchChunker, BatchReport, MAX_SQL_LENGTH};
pub use client::{Client, ClientBuilder};
pub use coercion::{CoercionDetector, CoercionWarning, WarningKind};
pub use heal::{HealAction, InsertReport, SchemaHealer};
pub use transport::{Driver, DriverConnection, NativeTransport, RestTransport, Transport};

pub use tsi_common::{
    ClassifiedError, ColumnMeta, Error, ErrorKind, Field, QueryResult, Result, RowMap, SqlErrorKind,
    Table, Value,
};
pub use tsi_config::ClientConfig;
