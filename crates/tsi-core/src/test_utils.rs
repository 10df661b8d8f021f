//! In-memory stand-ins for the server, for tests.
//!
//! - [`ScriptedTransport`] records every statement and fails the ones that
//!   match scripted rules.
//! - [`MockDriver`] plays a native driver whose sessions can be scripted the
//!   same way, and counts connects and closes.

use crate::transport::{Driver, DriverConnection, DriverError, DriverRows, SqlResult, Transport};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tsi_common::{ClassifiedError, QueryResult, SqlErrorKind};

/// Fails statements containing `needle`, a limited number of times or forever.
#[derive(Debug, Clone)]
struct FailureRule {
    needle: String,
    remaining: Option<usize>,
    kind: SqlErrorKind,
    message: String,
}

impl FailureRule {
    fn matches(&self, sql: &str) -> bool {
        self.remaining != Some(0) && sql.contains(&self.needle)
    }
}

fn fire(rules: &mut [FailureRule], sql: &str) -> Option<(SqlErrorKind, String)> {
    let rule = rules.iter_mut().find(|r| r.matches(sql))?;
    if let Some(n) = rule.remaining.as_mut() {
        *n -= 1;
    }
    Some((rule.kind, rule.message.clone()))
}

/// A transport that succeeds unless a rule says otherwise.
///
/// Rules are consulted in the order they were added; the first one that
/// matches and still has failures left fires.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    database: Option<String>,
    rules: Mutex<Vec<FailureRule>>,
    statements: Mutex<Vec<String>>,
    results: Mutex<VecDeque<QueryResult>>,
    closed: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Fail the next `times` statements containing `needle`.
    pub fn fail_times(self, needle: &str, times: usize, kind: SqlErrorKind, message: &str) -> Self {
        self.push_rule(needle, Some(times), kind, message)
    }

    /// Fail every statement containing `needle`.
    pub fn fail_when(self, needle: &str, kind: SqlErrorKind, message: &str) -> Self {
        self.push_rule(needle, None, kind, message)
    }

    /// Queue a result for the next successful query.
    pub fn with_result(self, result: QueryResult) -> Self {
        self.results.lock().push_back(result);
        self
    }

    fn push_rule(self, needle: &str, remaining: Option<usize>, kind: SqlErrorKind, message: &str) -> Self {
        self.rules.lock().push(FailureRule {
            needle: needle.to_string(),
            remaining,
            kind,
            message: message.to_string(),
        });
        self
    }

    /// Every statement received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn run(&self, sql: &str) -> SqlResult<()> {
        self.statements.lock().push(sql.to_string());
        match fire(&mut self.rules.lock(), sql) {
            Some((kind, message)) => Err(ClassifiedError::new(kind, message)),
            None => Ok(()),
        }
    }
}

impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn execute(&self, sql: &str) -> SqlResult<()> {
        self.run(sql)
    }

    fn query(&self, sql: &str) -> SqlResult<QueryResult> {
        self.run(sql)?;
        Ok(self.results.lock().pop_front().unwrap_or_default())
    }

    fn default_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<FailureRule>,
    statements: Vec<String>,
    rows: VecDeque<DriverRows>,
}

/// A native driver backed by shared in-memory state.
#[derive(Debug, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    refuse: bool,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect attempt fails with a connection error.
    pub fn refuse_connections(mut self) -> Self {
        self.refuse = true;
        self
    }

    pub fn fail_times(self, needle: &str, times: usize, message: &str) -> Self {
        self.state.lock().rules.push(FailureRule {
            needle: needle.to_string(),
            remaining: Some(times),
            kind: SqlErrorKind::Other,
            message: message.to_string(),
        });
        self
    }

    pub fn with_rows(self, rows: DriverRows) -> Self {
        self.state.lock().rows.push_back(rows);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(&self, _dsn: &str, _user: &str, _password: &str) -> Result<Box<dyn DriverConnection>, DriverError> {
        if self.refuse {
            return Err(DriverError::connection("Unable to establish connection"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            closes: Arc::clone(&self.closes),
            closed: false,
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl MockConnection {
    fn run(&mut self, sql: &str) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::connection("connection is closed"));
        }
        let mut state = self.state.lock();
        state.statements.push(sql.to_string());
        match fire(&mut state.rules, sql) {
            Some((_, message)) => Err(DriverError::statement(message)),
            None => Ok(()),
        }
    }
}

impl DriverConnection for MockConnection {
    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.run(sql)
    }

    fn query(&mut self, sql: &str) -> Result<DriverRows, DriverError> {
        self.run(sql)?;
        Ok(self.state.lock().rows.pop_front().unwrap_or_default())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
