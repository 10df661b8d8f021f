//! The ingestion client.
//!
//! A [`Client`] owns one transport plus the per-client strict-mode toggle and
//! runs every insert through coercion checks, statement rendering and schema
//! healing. Clients are `Send + Sync`; share one behind an `Arc`.

use crate::batch::{BatchChunker, BatchReport};
use crate::coercion::CoercionDetector;
use crate::heal::{InsertReport, SchemaHealer};
use crate::transport::{Driver, NativeTransport, RestTransport, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use tsi_common::{Error, QueryResult, Result, Table};
use tsi_config::{ClientConfig, Endpoint, TransportKind};

/// Statement used to check liveness.
pub const PING_SQL: &str = "SELECT SERVER_VERSION()";

pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    detector: CoercionDetector,
    closed: AtomicBool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport.name())
            .field("database", &self.transport.default_database())
            .field("strict_type_check", &self.strict_type_check())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Client {
    /// Client over the REST endpoint at `url`.
    pub fn rest(url: &str, config: ClientConfig) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(Error::InvalidInput("connection url must not be blank".to_string()));
        }
        config.validate()?;
        let endpoint = Endpoint::parse(url)?;
        let transport = RestTransport::new(&endpoint, &config)?;
        Self::with_transport(Arc::new(transport), config)
    }

    /// Client over a native driver.
    pub fn native(
        driver: Arc<dyn Driver>,
        url: &str,
        user: &str,
        password: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        ClientBuilder::new()
            .url(url)
            .credentials(user, password)
            .driver(driver)
            .config(config)
            .build()
    }

    /// Pick the transport from the URL scheme.
    ///
    /// `rest://`, `http://` and `https://` select REST; anything else needs
    /// `driver`.
    pub fn connect(url: &str, config: ClientConfig, driver: Option<Arc<dyn Driver>>) -> Result<Self> {
        let mut builder = ClientBuilder::new().url(url).config(config);
        if let Some(driver) = driver {
            builder = builder.driver(driver);
        }
        builder.build()
    }

    /// Client over an already-built transport.
    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        info!(
            transport = transport.name(),
            database = ?transport.default_database(),
            strict = config.strict_type_check,
            "client ready"
        );
        Ok(Self {
            detector: CoercionDetector::new(config.strict_type_check),
            transport,
            config,
            closed: AtomicBool::new(false),
        })
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Insert one record, creating or altering the table as needed.
    pub fn insert(&self, table: &Table) -> Result<InsertReport> {
        self.ensure_open()?;
        table.validate()?;
        self.detector.inspect(table)?;
        self.healer().insert(table)
    }

    /// Insert many records with packed multi-row statements.
    pub fn insert_batch(&self, tables: &[Table]) -> Result<BatchReport> {
        self.ensure_open()?;
        BatchChunker::new(
            self.transport.as_ref(),
            &self.detector,
            self.config.max_attempts,
            self.config.max_sql_length,
        )
        .insert_many(tables)
    }

    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        self.ensure_open()?;
        let sql = non_blank(sql)?;
        Ok(self.transport.query(sql)?)
    }

    pub fn execute(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        let sql = non_blank(sql)?;
        Ok(self.transport.execute(sql)?)
    }

    /// Toggle strict coercion checking; applies to the next check.
    pub fn set_strict_type_check(&self, enabled: bool) {
        self.detector.set_strict(enabled);
        debug!(enabled, "strict type check toggled");
    }

    pub fn strict_type_check(&self) -> bool {
        self.detector.is_strict()
    }

    /// Handle to the strict-mode flag, for toggling from elsewhere.
    pub fn strict_handle(&self) -> Arc<AtomicBool> {
        self.detector.handle()
    }

    /// Whether the server answers a trivial query.
    pub fn is_connected(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.transport.query(PING_SQL) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "connectivity check failed");
                false
            }
        }
    }

    /// Release the transport. Later calls fail with [`Error::ClientClosed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.transport.close();
        info!(transport = self.transport.name(), "client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn default_database(&self) -> Option<&str> {
        self.transport.default_database()
    }

    fn healer(&self) -> SchemaHealer<'_> {
        SchemaHealer::new(self.transport.as_ref(), self.config.max_attempts)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        Ok(())
    }
}

fn non_blank(sql: &str) -> Result<&str> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("sql must not be blank".to_string()));
    }
    Ok(trimmed)
}

/// Fluent construction of a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    url: Option<String>,
    credentials: Option<(String, String)>,
    driver: Option<Arc<dyn Driver>>,
    transport: Option<Arc<dyn Transport>>,
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Explicit credentials; they override any in the URL.
    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.credentials = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Use this transport instead of building one from a URL.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strict_type_check(mut self, enabled: bool) -> Self {
        self.config.strict_type_check = enabled;
        self
    }

    pub fn build(self) -> Result<Client> {
        if let Some(transport) = self.transport {
            return Client::with_transport(transport, self.config);
        }

        let Some(url) = self.url else {
            return Err(Error::NotInitialized(
                "no connection url or transport configured".to_string(),
            ));
        };
        if url.trim().is_empty() {
            return Err(Error::InvalidInput("connection url must not be blank".to_string()));
        }
        self.config.validate()?;

        let mut endpoint = Endpoint::parse(&url)?;
        if let Some((user, password)) = &self.credentials {
            if user.trim().is_empty() {
                return Err(Error::InvalidInput("user must not be blank".to_string()));
            }
            endpoint = endpoint.with_credentials(user, password);
        }

        let transport: Arc<dyn Transport> = match endpoint.kind {
            TransportKind::Rest => Arc::new(RestTransport::new(&endpoint, &self.config)?),
            TransportKind::Native => {
                let driver = self.driver.ok_or_else(|| {
                    Error::connection_init(format!(
                        "no native driver available for {}",
                        endpoint.raw
                    ))
                })?;
                Arc::new(NativeTransport::connect(
                    driver,
                    &endpoint.raw,
                    &endpoint.user,
                    &endpoint.password,
                    endpoint.database.clone(),
                    &self.config,
                )?)
            }
        };

        Client::with_transport(transport, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDriver, ScriptedTransport};
    use tsi_common::{ErrorKind, SqlErrorKind};

    fn scripted(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, Client) {
        let transport = Arc::new(transport);
        let client = Client::with_transport(transport.clone(), ClientConfig::default()).unwrap();
        (transport, client)
    }

    fn record() -> Table {
        Table::new("meters")
            .unwrap()
            .field("ts", "t", 1_700_000_000_000i64)
            .unwrap()
            .field("current", "i", 10.5)
            .unwrap()
    }

    #[test]
    fn client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Client>();
    }

    #[test]
    fn builder_without_source_is_not_initialized() {
        let err = ClientBuilder::new().build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
    }

    #[test]
    fn blank_url_is_invalid_input() {
        let err = Client::rest("   ", ClientConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn blank_user_is_invalid_input() {
        let driver: Arc<dyn Driver> = Arc::new(MockDriver::new());
        let err = Client::native(driver, "taos://localhost:6030/db", " ", "pw", ClientConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn rest_factory_rejects_native_url() {
        let err = Client::rest("taos://localhost:6030/db", ClientConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn native_url_without_driver_fails_init() {
        let err = Client::connect("taos://localhost:6030/db", ClientConfig::default(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionInitFailed);
        assert_eq!(err.code(), 20);
    }

    #[test]
    fn unreachable_native_server_fails_init() {
        let driver: Arc<dyn Driver> = Arc::new(MockDriver::new().refuse_connections());
        let err = Client::connect("taos://localhost:6030/db", ClientConfig::default(), Some(driver))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionInitFailed);
    }

    #[test]
    fn rest_url_builds_rest_client() {
        let client = Client::connect("rest://localhost:6041/power", ClientConfig::default(), None).unwrap();
        assert_eq!(client.transport_name(), "rest");
        assert_eq!(client.default_database(), Some("power"));
    }

    #[test]
    fn native_client_routes_through_driver() {
        let driver = Arc::new(MockDriver::new());
        let client = Client::native(
            driver.clone(),
            "taos://localhost:6030?db=power",
            "root",
            "taosdata",
            ClientConfig::default(),
        )
        .unwrap();
        client.execute("CREATE DATABASE IF NOT EXISTS power").unwrap();
        let report = client.insert(&record()).unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(
            driver.statements(),
            vec![
                "CREATE DATABASE IF NOT EXISTS power".to_string(),
                "INSERT INTO power.meters (ts, current) VALUES (1700000000000, 10.5)".to_string(),
            ]
        );
        // connection test plus reuse: one session
        assert_eq!(driver.connect_count(), 1);
        client.close();
        assert_eq!(driver.closed_count(), 1);
    }

    #[test]
    fn strict_mode_rejects_before_sending() {
        let (transport, client) = scripted(ScriptedTransport::new());
        client.insert(&record()).unwrap();
        client.set_strict_type_check(true);
        let err = client.insert(&record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueTypeCoercion);
        assert_eq!(transport.statements().len(), 1);
    }

    #[test]
    fn strict_handle_is_shared() {
        let (_, client) = scripted(ScriptedTransport::new());
        let handle = client.strict_handle();
        handle.store(true, Ordering::Relaxed);
        assert!(client.strict_type_check());
    }

    #[test]
    fn blank_sql_rejected() {
        let (transport, client) = scripted(ScriptedTransport::new());
        assert_eq!(client.query(" ").unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(client.execute("").unwrap_err().kind(), ErrorKind::InvalidInput);
        assert!(transport.statements().is_empty());
    }

    #[test]
    fn empty_table_rejected() {
        let (_, client) = scripted(ScriptedTransport::new());
        let err = client.insert(&Table::new("t").unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn query_errors_keep_classification() {
        let (_, client) = scripted(
            ScriptedTransport::new().fail_when("SELECT", SqlErrorKind::TableNotExist, "Table does not exist"),
        );
        let err = client.query("SELECT * FROM nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TableNotExist);
        assert_eq!(err.code(), 30);
    }

    #[test]
    fn closed_client_rejects_everything() {
        let (transport, client) = scripted(ScriptedTransport::new());
        assert!(client.is_connected());
        client.close();
        client.close();
        assert!(transport.is_closed());
        assert!(!client.is_connected());
        for err in [
            client.insert(&record()).unwrap_err(),
            client.insert_batch(&[record()]).unwrap_err(),
            client.query("SELECT 1").unwrap_err(),
            client.execute("SELECT 1").unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::ClientClosed);
        }
    }

    #[test]
    fn failed_ping_means_not_connected() {
        let (_, client) = scripted(
            ScriptedTransport::new().fail_when(PING_SQL, SqlErrorKind::ConnectionError, "connection refused"),
        );
        assert!(!client.is_connected());
    }

    #[test]
    fn invalid_config_rejected() {
        let err = Client::with_transport(
            Arc::new(ScriptedTransport::new()),
            ClientConfig::default().with_max_attempts(0),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
