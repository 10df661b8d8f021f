//! Schema healing: bounded insert retries with repairs in between.
//!
//! Each attempt executes the single-row INSERT. A classified failure picks
//! the repair:
//!
//! | failure                | repair                                              |
//! |------------------------|-----------------------------------------------------|
//! | `TableNotExist`        | `CREATE TABLE IF NOT EXISTS` with every column      |
//! | `ColumnNotExist`       | `ADD COLUMN` for the named column, else for all     |
//! | `ColumnTypeMismatch`   | `DROP COLUMN` + `ADD COLUMN` for every column       |
//! | anything else          | none, the error propagates                          |
//!
//! No repair runs after the last attempt.

use crate::sql;
use crate::transport::Transport;
use serde::Serialize;
use tracing::{debug, info, warn};
use tsi_common::{ClassifiedError, Error, Field, Result, SqlErrorKind, Table};

/// A repair performed between two attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HealAction {
    CreatedTable,
    AddedColumn { column: String },
    AddedAllColumns { added: usize, skipped: usize },
    RebuiltColumns { rebuilt: usize, skipped: usize },
}

/// Outcome of a successful insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub attempts: u32,
    pub repairs: Vec<HealAction>,
}

impl InsertReport {
    pub fn was_healed(&self) -> bool {
        !self.repairs.is_empty()
    }
}

pub struct SchemaHealer<'a> {
    transport: &'a dyn Transport,
    max_attempts: u32,
}

impl<'a> SchemaHealer<'a> {
    pub fn new(transport: &'a dyn Transport, max_attempts: u32) -> Self {
        Self {
            transport,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Insert one record, repairing the schema between failed attempts.
    pub fn insert(&self, table: &Table) -> Result<InsertReport> {
        table.validate()?;

        let default_db = self.transport.default_database();
        let qualified = table.qualified_name(default_db);
        let statement = sql::insert_sql(table, default_db);
        let mut repairs = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.transport.execute(&statement) {
                Ok(()) => {
                    if !repairs.is_empty() {
                        info!(table = %qualified, attempts = attempt, repairs = repairs.len(), "insert succeeded after schema repair");
                    }
                    return Ok(InsertReport {
                        attempts: attempt,
                        repairs,
                    });
                }
                Err(err) => err,
            };

            if !err.kind().is_repairable() {
                debug!(table = %qualified, attempt, kind = %err.kind(), "insert failed, not repairable");
                return Err(err.into());
            }

            if attempt >= self.max_attempts {
                warn!(table = %qualified, attempts = attempt, kind = %err.kind(), error = %err, "insert failed after retries");
                return Err(Error::InsertFailedAfterRetry {
                    table: qualified,
                    attempts: attempt,
                    source: err,
                });
            }

            warn!(table = %qualified, attempt, kind = %err.kind(), error = %err, "insert failed, repairing schema");
            let action = match err.kind() {
                SqlErrorKind::TableNotExist => self.create_table(table)?,
                SqlErrorKind::ColumnNotExist => self.add_missing_column(table, &qualified, &err)?,
                // ColumnTypeMismatch, the only other repairable kind
                _ => self.rebuild_columns(table, &qualified)?,
            };
            repairs.push(action);
        }
    }

    fn create_table(&self, table: &Table) -> Result<HealAction> {
        let statement = sql::create_table_sql(table, self.transport.default_database());
        self.transport.execute(&statement).map_err(|e| {
            warn!(table = %table.name(), error = %e, "create table failed");
            Error::from(e)
        })?;
        info!(table = %table.name(), columns = table.field_count(), "created table");
        Ok(HealAction::CreatedTable)
    }

    fn add_missing_column(&self, table: &Table, qualified: &str, err: &ClassifiedError) -> Result<HealAction> {
        let target = err
            .missing_column_name()
            .and_then(|name| table.get_field(&name));

        match target {
            Some(field) => {
                if self.best_effort(&sql::add_column_sql(qualified, field), field.name())? {
                    info!(table = %qualified, column = %field.name(), "added missing column");
                    return Ok(HealAction::AddedColumn {
                        column: field.name().to_string(),
                    });
                }
            }
            None => debug!(table = %qualified, error = %err, "missing column not identified"),
        }

        let mut added = 0;
        let mut skipped = 0;
        for field in table.fields() {
            if self.best_effort(&sql::add_column_sql(qualified, field), field.name())? {
                added += 1;
            } else {
                skipped += 1;
            }
        }
        info!(table = %qualified, added, skipped, "added columns");
        Ok(HealAction::AddedAllColumns { added, skipped })
    }

    fn rebuild_columns(&self, table: &Table, qualified: &str) -> Result<HealAction> {
        let mut rebuilt = 0;
        let mut skipped = 0;
        for field in table.fields() {
            if self.rebuild_column(qualified, field)? {
                rebuilt += 1;
            } else {
                skipped += 1;
            }
        }
        info!(table = %qualified, rebuilt, skipped, "rebuilt columns with declared types");
        Ok(HealAction::RebuiltColumns { rebuilt, skipped })
    }

    fn rebuild_column(&self, qualified: &str, field: &Field) -> Result<bool> {
        self.best_effort(&sql::drop_column_sql(qualified, field.name()), field.name())?;
        self.best_effort(&sql::add_column_sql(qualified, field), field.name())
    }

    /// Run a repair statement. Connection loss aborts; any other failure
    /// (column already exists, cannot drop the timestamp column…) is logged.
    fn best_effort(&self, statement: &str, column: &str) -> Result<bool> {
        match self.transport.execute(statement) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == SqlErrorKind::ConnectionError => Err(e.into()),
            Err(e) => {
                debug!(column, error = %e, "repair statement failed, skipping");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedTransport;
    use tsi_common::ErrorKind;

    fn record() -> Table {
        Table::new("meters")
            .unwrap()
            .with_database("power")
            .field("ts", "t", 1_700_000_000_000i64)
            .unwrap()
            .field("current", "d", 10.3)
            .unwrap()
            .field("voltage", "i", 220i32)
            .unwrap()
    }

    #[test]
    fn success_on_first_attempt() {
        let transport = ScriptedTransport::new();
        let report = SchemaHealer::new(&transport, 3).insert(&record()).unwrap();
        assert_eq!(report.attempts, 1);
        assert!(!report.was_healed());
        assert_eq!(transport.statements().len(), 1);
    }

    #[test]
    fn missing_table_is_created() {
        let transport = ScriptedTransport::new().fail_times(
            "INSERT INTO",
            1,
            SqlErrorKind::TableNotExist,
            "Table does not exist",
        );
        let report = SchemaHealer::new(&transport, 3).insert(&record()).unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.repairs, vec![HealAction::CreatedTable]);

        let statements = transport.statements();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[1],
            "CREATE TABLE IF NOT EXISTS power.meters (ts TIMESTAMP, current DOUBLE, voltage INT)"
        );
    }

    #[test]
    fn named_missing_column_is_added_alone() {
        let transport = ScriptedTransport::new().fail_times(
            "INSERT INTO",
            1,
            SqlErrorKind::ColumnNotExist,
            "Invalid column name: voltage",
        );
        let report = SchemaHealer::new(&transport, 3).insert(&record()).unwrap();
        assert_eq!(
            report.repairs,
            vec![HealAction::AddedColumn {
                column: "voltage".to_string()
            }]
        );
        assert_eq!(
            transport.statements()[1],
            "ALTER TABLE power.meters ADD COLUMN voltage INT"
        );
    }

    #[test]
    fn unidentified_missing_column_adds_all() {
        let transport = ScriptedTransport::new()
            .fail_times("INSERT INTO", 1, SqlErrorKind::ColumnNotExist, "column does not exist")
            .fail_when("ADD COLUMN ts", SqlErrorKind::Other, "column already exists");
        let report = SchemaHealer::new(&transport, 3).insert(&record()).unwrap();
        assert_eq!(
            report.repairs,
            vec![HealAction::AddedAllColumns { added: 2, skipped: 1 }]
        );
        assert_eq!(transport.statements().len(), 5);
    }

    #[test]
    fn failed_targeted_add_falls_back_to_all() {
        let transport = ScriptedTransport::new()
            .fail_times("INSERT INTO", 1, SqlErrorKind::ColumnNotExist, "Unknown column 'voltage'")
            .fail_times("ADD COLUMN voltage", 1, SqlErrorKind::Other, "invalid column type");
        let report = SchemaHealer::new(&transport, 3).insert(&record()).unwrap();
        assert_eq!(
            report.repairs,
            vec![HealAction::AddedAllColumns { added: 3, skipped: 0 }]
        );
    }

    #[test]
    fn unknown_column_name_adds_all() {
        let transport = ScriptedTransport::new().fail_times(
            "INSERT INTO",
            1,
            SqlErrorKind::ColumnNotExist,
            "Unknown column 'humidity'",
        );
        let report = SchemaHealer::new(&transport, 3).insert(&record()).unwrap();
        assert!(matches!(report.repairs[0], HealAction::AddedAllColumns { added: 3, .. }));
    }

    #[test]
    fn type_mismatch_rebuilds_every_column() {
        let transport = ScriptedTransport::new()
            .fail_times("INSERT INTO", 1, SqlErrorKind::ColumnTypeMismatch, "data type mismatch")
            .fail_when("DROP COLUMN ts", SqlErrorKind::Other, "cannot drop primary timestamp")
            .fail_when("ADD COLUMN ts", SqlErrorKind::Other, "column already exists");
        let report = SchemaHealer::new(&transport, 3).insert(&record()).unwrap();
        assert_eq!(
            report.repairs,
            vec![HealAction::RebuiltColumns { rebuilt: 2, skipped: 1 }]
        );
        let statements = transport.statements();
        assert!(statements.contains(&"ALTER TABLE power.meters DROP COLUMN current".to_string()));
        assert!(statements.contains(&"ALTER TABLE power.meters ADD COLUMN current DOUBLE".to_string()));
    }

    #[test]
    fn other_errors_propagate_unchanged() {
        let transport = ScriptedTransport::new().fail_when("INSERT INTO", SqlErrorKind::Other, "syntax error");
        let err = SchemaHealer::new(&transport, 3).insert(&record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenericSqlError);
        assert_eq!(transport.statements().len(), 1);
    }

    #[test]
    fn db_not_specified_is_not_repaired() {
        let transport =
            ScriptedTransport::new().fail_when("INSERT INTO", SqlErrorKind::DbNotSpecified, "db is not specified");
        let err = SchemaHealer::new(&transport, 3).insert(&record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DbNotSpecified);
    }

    #[test]
    fn gives_up_after_budget_without_final_repair() {
        let transport =
            ScriptedTransport::new().fail_when("INSERT INTO", SqlErrorKind::TableNotExist, "Table does not exist");
        let err = SchemaHealer::new(&transport, 3).insert(&record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsertFailedAfterRetry);
        match &err {
            Error::InsertFailedAfterRetry { table, attempts, source } => {
                assert_eq!(table, "power.meters");
                assert_eq!(*attempts, 3);
                assert_eq!(source.kind(), SqlErrorKind::TableNotExist);
            }
            other => panic!("unexpected {other:?}"),
        }
        // 3 inserts, 2 creates
        assert_eq!(transport.statements().len(), 5);
    }

    #[test]
    fn create_failure_aborts() {
        let transport = ScriptedTransport::new()
            .fail_times("INSERT INTO", 1, SqlErrorKind::TableNotExist, "Table does not exist")
            .fail_when("CREATE TABLE", SqlErrorKind::Other, "permission denied");
        let err = SchemaHealer::new(&transport, 3).insert(&record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenericSqlError);
        assert_eq!(transport.statements().len(), 2);
    }

    #[test]
    fn connection_loss_during_repair_aborts() {
        let transport = ScriptedTransport::new()
            .fail_times("INSERT INTO", 1, SqlErrorKind::ColumnNotExist, "column does not exist")
            .fail_when("ALTER TABLE", SqlErrorKind::ConnectionError, "connection reset");
        let err = SchemaHealer::new(&transport, 3).insert(&record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
        assert_eq!(transport.statements().len(), 2);
    }

    #[test]
    fn empty_table_rejected_before_sending() {
        let transport = ScriptedTransport::new();
        let err = SchemaHealer::new(&transport, 3)
            .insert(&Table::new("empty").unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(transport.statements().is_empty());
    }

    #[test]
    fn uses_transport_default_database() {
        let transport = ScriptedTransport::new().with_database("grid");
        let table = Table::new("t").unwrap().field("v", "i", 1i32).unwrap();
        SchemaHealer::new(&transport, 3).insert(&table).unwrap();
        assert_eq!(transport.statements()[0], "INSERT INTO grid.t (v) VALUES (1)");
    }
}
