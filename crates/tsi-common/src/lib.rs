//! tsingest shared data model.
//!
//! This crate provides the types shared by the config and core crates:
//! - Column type normalization
//! - Typed values, fields and table records
//! - Transport-independent query results
//! - The unified error taxonomy

pub mod column_type;
pub mod error;
pub mod result;
pub mod schema;
pub mod value;

pub use column_type::{base_type, normalize_type};
pub use error::{ClassifiedError, Error, ErrorKind, Result, SqlErrorKind};
pub use result::{ColumnMeta, QueryResult, RowMap};
pub use schema::{Field, Table};
pub use value::Value;
