//! Scoped reuse of native driver sessions.

use super::native::{Driver, DriverConnection};
use super::SqlResult;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use tsi_common::{ClassifiedError, SqlErrorKind};

use super::native::classify_driver_error;

/// Idle sessions waiting for the next caller.
///
/// There is no cap on live sessions and no health checking beyond asking a
/// session whether it is closed.
pub struct ConnectionPool {
    driver: Arc<dyn Driver>,
    dsn: String,
    user: String,
    password: String,
    idle: Mutex<Vec<Box<dyn DriverConnection>>>,
    max_idle: usize,
    shut_down: AtomicBool,
}

impl ConnectionPool {
    pub fn new(
        driver: Arc<dyn Driver>,
        dsn: &str,
        user: &str,
        password: &str,
        max_idle: usize,
    ) -> Self {
        Self {
            driver,
            dsn: dsn.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            idle: Mutex::new(Vec::new()),
            max_idle,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Borrow a session, reusing an idle one when possible.
    ///
    /// The session is handed back when the guard drops.
    pub fn acquire(&self) -> SqlResult<PooledConnection<'_>> {
        if self.is_shut_down() {
            return Err(ClassifiedError::new(
                SqlErrorKind::ConnectionError,
                "connection pool is shut down",
            ));
        }

        loop {
            let candidate = self.idle.lock().pop();
            match candidate {
                Some(mut conn) if conn.is_closed() => {
                    debug!("discarding closed idle connection");
                    conn.close();
                }
                Some(conn) => {
                    trace!("reusing idle connection");
                    return Ok(PooledConnection::new(self, conn));
                }
                None => break,
            }
        }

        let conn = self
            .driver
            .connect(&self.dsn, &self.user, &self.password)
            .map_err(classify_driver_error)?;
        trace!(driver = self.driver.name(), "opened connection");
        Ok(PooledConnection::new(self, conn))
    }

    /// Number of sessions currently idle.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Close every idle session and refuse further acquires.
    ///
    /// Sessions still borrowed are closed when their guards drop.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<_> = std::mem::take(&mut *self.idle.lock());
        debug!(count = drained.len(), "closing idle connections");
        for mut conn in drained {
            conn.close();
        }
    }

    fn release(&self, mut conn: Box<dyn DriverConnection>) {
        if conn.is_closed() {
            return;
        }
        if self.is_shut_down() {
            conn.close();
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        } else {
            drop(idle);
            conn.close();
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A borrowed session; returns to its pool on drop.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Box<dyn DriverConnection>>,
}

impl<'a> PooledConnection<'a> {
    fn new(pool: &'a ConnectionPool, conn: Box<dyn DriverConnection>) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }
}

impl Deref for PooledConnection<'_> {
    type Target = dyn DriverConnection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn.as_ref(),
            None => unreachable!("connection taken before drop"),
        }
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn.as_mut(),
            None => unreachable!("connection taken before drop"),
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
