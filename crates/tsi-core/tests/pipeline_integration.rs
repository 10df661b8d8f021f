//! Integration tests for the ingestion pipeline against in-memory servers.
//!
//! Tests cover:
//! - Schema healing through the client for each repairable failure
//! - Retry exhaustion and non-repairable failures
//! - Batch packing at the default statement ceiling
//! - Native transport sessions, result typing and shutdown
//! - Configuration files feeding client construction

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tsi_config::{resolve_config_from, ConfigPaths, ConfigSource};
use tsi_core::heal::HealAction;
use tsi_core::test_utils::{MockDriver, ScriptedTransport};
use tsi_core::transport::{DriverColumn, DriverRows, RawCell};
use tsi_core::{Client, ClientConfig, Driver, ErrorKind, SqlErrorKind, Table, Value, MAX_SQL_LENGTH};

fn meter(ts: i64, current: f64) -> Table {
    Table::new("meters")
        .unwrap()
        .with_database("power")
        .field("ts", "t", ts)
        .unwrap()
        .field("current", "d", current)
        .unwrap()
        .field("location", "s", "roof")
        .unwrap()
}

fn client_over(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, Client) {
    let transport = Arc::new(transport);
    let client = Client::with_transport(transport.clone(), ClientConfig::default()).unwrap();
    (transport, client)
}

#[test]
fn missing_table_is_created_then_insert_retried() {
    let (transport, client) = client_over(ScriptedTransport::new().fail_times(
        "INSERT INTO power.meters",
        1,
        SqlErrorKind::TableNotExist,
        "Table does not exist",
    ));

    let report = client.insert(&meter(1_700_000_000_000, 10.3)).unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.repairs, vec![HealAction::CreatedTable]);
    let statements = transport.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(
        statements[1],
        "CREATE TABLE IF NOT EXISTS power.meters (ts TIMESTAMP, current DOUBLE, location VARCHAR(255))"
    );
    assert_eq!(statements[0], statements[2]);
}

#[test]
fn named_missing_column_is_added_alone() {
    let (transport, client) = client_over(ScriptedTransport::new().fail_times(
        "INSERT INTO",
        1,
        SqlErrorKind::ColumnNotExist,
        "Invalid column name: location",
    ));

    let report = client.insert(&meter(1_700_000_000_000, 10.3)).unwrap();

    assert_eq!(
        report.repairs,
        vec![HealAction::AddedColumn {
            column: "location".to_string()
        }]
    );
    assert_eq!(
        transport.statements()[1],
        "ALTER TABLE power.meters ADD COLUMN location VARCHAR(255)"
    );
}

#[test]
fn anonymous_missing_column_adds_every_column() {
    let (transport, client) = client_over(
        ScriptedTransport::new()
            .fail_times("INSERT INTO", 1, SqlErrorKind::ColumnNotExist, "some column is missing")
            // the timestamp and current columns already exist
            .fail_times("ADD COLUMN ts", 1, SqlErrorKind::Other, "duplicated column name")
            .fail_times("ADD COLUMN current", 1, SqlErrorKind::Other, "duplicated column name"),
    );

    let report = client.insert(&meter(1_700_000_000_000, 10.3)).unwrap();

    assert_eq!(
        report.repairs,
        vec![HealAction::AddedAllColumns { added: 1, skipped: 2 }]
    );
    let alters = transport
        .statements()
        .iter()
        .filter(|s| s.starts_with("ALTER TABLE"))
        .count();
    assert_eq!(alters, 3);
}

#[test]
fn type_mismatch_rebuilds_columns() {
    let (transport, client) = client_over(ScriptedTransport::new().fail_times(
        "INSERT INTO",
        1,
        SqlErrorKind::ColumnTypeMismatch,
        "Data type mismatch",
    ));

    let report = client.insert(&meter(1_700_000_000_000, 10.3)).unwrap();

    assert_eq!(
        report.repairs,
        vec![HealAction::RebuiltColumns { rebuilt: 3, skipped: 0 }]
    );
    let statements = transport.statements();
    assert!(statements.contains(&"ALTER TABLE power.meters DROP COLUMN current".to_string()));
    assert!(statements.contains(&"ALTER TABLE power.meters ADD COLUMN current DOUBLE".to_string()));
}

#[test]
fn persistent_failure_exhausts_attempts() {
    let (transport, client) = client_over(ScriptedTransport::new().fail_when(
        "INSERT INTO",
        SqlErrorKind::TableNotExist,
        "Table does not exist",
    ));

    let err = client.insert(&meter(1_700_000_000_000, 10.3)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsertFailedAfterRetry);
    assert_eq!(err.code(), 50);
    let classified = err.classified().unwrap();
    assert_eq!(classified.kind(), SqlErrorKind::TableNotExist);
    let inserts = transport
        .statements()
        .iter()
        .filter(|s| s.starts_with("INSERT INTO"))
        .count();
    assert_eq!(inserts, 3);
}

#[test]
fn configured_attempts_bound_the_loop() {
    let transport = Arc::new(ScriptedTransport::new().fail_when(
        "INSERT INTO",
        SqlErrorKind::ColumnTypeMismatch,
        "type mismatch",
    ));
    let client = Client::with_transport(
        transport.clone(),
        ClientConfig::default().with_max_attempts(1),
    )
    .unwrap();

    let err = client.insert(&meter(1, 1.0)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsertFailedAfterRetry);
    // no repair after the final attempt
    assert_eq!(transport.statements().len(), 1);
}

#[test]
fn non_repairable_failure_propagates_at_once() {
    let (transport, client) = client_over(ScriptedTransport::new().fail_when(
        "INSERT INTO",
        SqlErrorKind::DbNotSpecified,
        "Database not specified",
    ));

    let err = client.insert(&meter(1, 1.0)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DbNotSpecified);
    assert_eq!(transport.statements().len(), 1);
}

#[test]
fn lost_connection_aborts_repair() {
    let (transport, client) = client_over(
        ScriptedTransport::new()
            .fail_times("INSERT INTO", 1, SqlErrorKind::ColumnNotExist, "Invalid column name: location")
            .fail_when("ALTER TABLE", SqlErrorKind::ConnectionError, "connection reset"),
    );

    let err = client.insert(&meter(1, 1.0)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionError);
    assert_eq!(transport.statements().len(), 2);
}

#[test]
fn two_large_records_need_two_statements() {
    let (transport, client) = client_over(ScriptedTransport::new());
    let payload = "x".repeat(600_000);
    let records: Vec<Table> = (0..2)
        .map(|i| {
            Table::new("logs")
                .unwrap()
                .field("ts", "t", 1_700_000_000_000i64 + i)
                .unwrap()
                .field("body", "varchar(700000)", payload.as_str())
                .unwrap()
        })
        .collect();

    let report = client.insert_batch(&records).unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.chunks, 2);
    assert_eq!(report.degraded_chunks, 0);
    for statement in transport.statements() {
        assert!(statement.chars().count() <= MAX_SQL_LENGTH);
        assert!(statement.starts_with("INSERT INTO logs (ts, body) VALUES"));
        assert!(statement.ends_with(';'));
    }
}

#[test]
fn small_records_share_one_statement() {
    let (transport, client) = client_over(ScriptedTransport::new());
    let records: Vec<Table> = (0..50).map(|i| meter(1_700_000_000_000 + i, i as f64)).collect();

    let report = client.insert_batch(&records).unwrap();

    assert_eq!(report.inserted, 50);
    assert_eq!(report.chunks, 1);
    let statements = transport.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].lines().count(), 50);
}

#[test]
fn failed_chunk_degrades_and_heals_rows() {
    let (transport, client) = client_over(
        ScriptedTransport::new()
            .fail_times("\n", 1, SqlErrorKind::TableNotExist, "Table does not exist")
            .fail_times("INSERT INTO power.meters", 1, SqlErrorKind::TableNotExist, "Table does not exist"),
    );
    let records: Vec<Table> = (0..3).map(|i| meter(1_700_000_000_000 + i, 1.5)).collect();

    let report = client.insert_batch(&records).unwrap();

    assert_eq!(report.inserted, 3);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.degraded_chunks, 1);
    let creates = transport
        .statements()
        .iter()
        .filter(|s| s.starts_with("CREATE TABLE"))
        .count();
    assert_eq!(creates, 1);
}

#[test]
fn strict_batch_stops_at_coercing_record() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = Client::builder()
        .transport(transport.clone())
        .strict_type_check(true)
        .build()
        .unwrap();
    let bad = Table::new("meters")
        .unwrap()
        .field("ts", "t", 1i64)
        .unwrap()
        .field("phase", "i", 2.5)
        .unwrap();

    let err = client.insert_batch(&[meter(1, 1.0), bad.clone()]).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValueTypeCoercion);
    assert_eq!(err.identifier().as_deref(), Some("phase"));
    assert!(transport.statements().is_empty());

    // single and batch inserts report the same kind
    assert_eq!(client.insert(&bad).unwrap_err().kind(), err.kind());
}

#[test]
fn native_client_heals_over_one_session() {
    let driver = Arc::new(MockDriver::new().fail_times("INSERT INTO", 1, "Table does not exist"));
    let client = Client::native(
        driver.clone(),
        "taos://localhost:6030?db=power",
        "root",
        "taosdata",
        ClientConfig::default(),
    )
    .unwrap();

    let report = client
        .insert(&Table::new("meters").unwrap().field("ts", "t", 1i64).unwrap())
        .unwrap();

    assert!(report.was_healed());
    assert_eq!(
        driver.statements(),
        vec![
            "INSERT INTO power.meters (ts) VALUES (1)".to_string(),
            "CREATE TABLE IF NOT EXISTS power.meters (ts TIMESTAMP)".to_string(),
            "INSERT INTO power.meters (ts) VALUES (1)".to_string(),
        ]
    );
    assert_eq!(driver.connect_count(), 1);

    client.close();
    assert_eq!(driver.closed_count(), 1);
    assert_eq!(client.execute("SELECT 1").unwrap_err().kind(), ErrorKind::ClientClosed);
}

#[test]
fn native_query_types_cells_by_column() {
    let rows = DriverRows {
        columns: vec![
            DriverColumn::new("ts", "TIMESTAMP", None),
            DriverColumn::new("on", "BOOL", None),
            DriverColumn::new("tag", "BINARY", Some(8)),
        ],
        rows: vec![vec![
            RawCell::Int(1_700_000_000_000),
            RawCell::Int(1),
            RawCell::Bytes(b"east\0\0\0\0".to_vec()),
        ]],
        affected_rows: None,
    };
    let driver: Arc<dyn Driver> = Arc::new(MockDriver::new().with_rows(DriverRows::default()).with_rows(rows));
    let config = ClientConfig::default().with_decode_binary_as_text(true);
    let client = Client::native(driver, "taos://localhost:6030?db=power", "root", "taosdata", config).unwrap();

    // first queued result answers the liveness check
    assert!(client.is_connected());
    let result = client.query("SELECT * FROM meters").unwrap();

    assert_eq!(result.row_count(), 1);
    assert_eq!(result.get(0, "ts"), Some(&Value::timestamp_millis(1_700_000_000_000)));
    assert_eq!(result.get(0, "on"), Some(&Value::Bool(true)));
    assert_eq!(result.get(0, "tag"), Some(&Value::Text("east".to_string())));
    let maps = result.to_map_list();
    assert_eq!(maps[0].keys().collect::<Vec<_>>(), vec!["ts", "on", "tag"]);
}

#[test]
fn config_file_drives_client() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "strict_type_check = true\nmax_attempts = 2\n").unwrap();
    let paths = ConfigPaths {
        explicit: Some(path.clone()),
        ..ConfigPaths::default()
    };

    let resolved = resolve_config_from(&paths, |_| None).unwrap();
    assert_eq!(resolved.source, ConfigSource::File(path));

    let transport = Arc::new(ScriptedTransport::new().fail_when(
        "INSERT INTO",
        SqlErrorKind::TableNotExist,
        "Table does not exist",
    ));
    let client = Client::with_transport(transport.clone(), resolved.config).unwrap();
    assert!(client.strict_type_check());

    let err = client.insert(&meter(1, 1.0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsertFailedAfterRetry);
    let inserts = transport
        .statements()
        .iter()
        .filter(|s| s.starts_with("INSERT INTO"))
        .count();
    assert_eq!(inserts, 2);
}

#[test]
fn environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "strict_type_check = true\n").unwrap();
    let paths = ConfigPaths {
        explicit: Some(path),
        ..ConfigPaths::default()
    };

    let resolved = resolve_config_from(&paths, |key| {
        (key == tsi_config::resolve::ENV_STRICT_TYPE).then(|| "off".to_string())
    })
    .unwrap();

    assert!(!resolved.config.strict_type_check);
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let paths = ConfigPaths {
        explicit: Some(dir.path().join("absent.toml")),
        ..ConfigPaths::default()
    };
    assert!(resolve_config_from(&paths, |_| None).is_err());
}
