//! Row-shaped records: a [`Table`] is one row destined for one table, made of
//! typed [`Field`]s.

use crate::column_type::{base_type, normalize_type};
use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One column of a record: name, canonical type and value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldRecord")]
pub struct Field {
    name: String,
    column_type: String,
    value: Value,
}

impl Field {
    /// Build a field, canonicalizing `type_token`.
    pub fn new(name: impl Into<String>, type_token: &str, value: impl Into<Value>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("field name must not be blank".to_string()));
        }
        Ok(Self {
            name,
            column_type: normalize_type(type_token)?,
            value: value.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical declared type, e.g. `VARCHAR(255)`.
    pub fn column_type(&self) -> &str {
        &self.column_type
    }

    /// Declared type without length, e.g. `VARCHAR`.
    pub fn base_type(&self) -> String {
        base_type(&self.column_type)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} = {}", self.name, self.column_type, self.value)
    }
}

/// Serialized form of a [`Field`], checked on the way in.
#[derive(Deserialize)]
struct FieldRecord {
    name: String,
    column_type: String,
    value: Value,
}

impl TryFrom<FieldRecord> for Field {
    type Error = Error;

    fn try_from(record: FieldRecord) -> Result<Self> {
        Field::new(record.name, &record.column_type, record.value)
    }
}

/// Serialized form of a [`Table`]; fields go through [`Table::push_field`].
#[derive(Deserialize)]
struct TableRecord {
    name: String,
    #[serde(default)]
    database: Option<String>,
    fields: Vec<Field>,
}

impl TryFrom<TableRecord> for Table {
    type Error = Error;

    fn try_from(record: TableRecord) -> Result<Self> {
        let mut table = Table::new(record.name)?;
        if let Some(database) = record.database {
            table = table.with_database(database);
        }
        for field in record.fields {
            table.push_field(field)?;
        }
        Ok(table)
    }
}

/// A single record addressed to one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRecord")]
pub struct Table {
    name: String,
    database: Option<String>,
    fields: Vec<Field>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("table name must not be blank".to_string()));
        }
        Ok(Self {
            name,
            database: None,
            fields: Vec::new(),
        })
    }

    /// Set the owning database. Blank names are ignored.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        let database = database.into().trim().to_string();
        self.database = (!database.is_empty()).then_some(database);
        self
    }

    /// Append a field built from its parts.
    pub fn field(mut self, name: &str, type_token: &str, value: impl Into<Value>) -> Result<Self> {
        self.push_field(Field::new(name, type_token, value)?)?;
        Ok(self)
    }

    /// Append a field; names must be unique ignoring case.
    pub fn push_field(&mut self, field: Field) -> Result<()> {
        if self.get_field(field.name()).is_some() {
            return Err(Error::InvalidInput(format!(
                "duplicate field name '{}' in table {}",
                field.name(),
                self.name
            )));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// `database.name` when a database is set, else `name`.
    pub fn full_name(&self) -> String {
        self.qualified_name(None)
    }

    /// Like [`Table::full_name`], falling back to `default_db` when the table
    /// carries no database of its own.
    pub fn qualified_name(&self, default_db: Option<&str>) -> String {
        let db = self
            .database
            .as_deref()
            .or(default_db)
            .map(str::trim)
            .filter(|db| !db.is_empty());
        match db {
            Some(db) => format!("{db}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Case-insensitive field lookup.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        let name = name.trim();
        self.fields.iter().find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// Check the record is usable by the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::InvalidInput(format!(
                "table {} must contain at least one field",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} fields)", self.full_name(), self.fields.len())
    }
}
