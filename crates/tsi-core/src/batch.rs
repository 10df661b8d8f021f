//! Multi-row inserts under a statement length ceiling.
//!
//! Records are rendered as `<table> (<cols>) VALUES (<vals>)` fragments and
//! packed into `INSERT INTO <f1>\n<f2>…;` statements no longer than the
//! configured maximum, counted in characters. When a packed statement fails,
//! its records are retried one by one through the [`SchemaHealer`].
//!
//! Batches are not atomic. A chunk the server partially applied before
//! failing will have those rows written again by the per-row retry.

use crate::coercion::CoercionDetector;
use crate::heal::SchemaHealer;
use crate::sql;
use crate::transport::Transport;
use serde::Serialize;
use tracing::{debug, info, warn};
use tsi_common::{Error, Result, Table};

pub use tsi_config::DEFAULT_MAX_SQL_LENGTH as MAX_SQL_LENGTH;

/// Totals for one batch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Records written, whether packed or individually.
    pub inserted: usize,
    /// Packed statements sent.
    pub chunks: usize,
    /// Packed statements that failed and were retried row by row.
    pub degraded_chunks: usize,
}

pub struct BatchChunker<'a> {
    transport: &'a dyn Transport,
    detector: &'a CoercionDetector,
    healer: SchemaHealer<'a>,
    max_sql_length: usize,
}

/// Statement being filled.
struct Pending {
    statement: String,
    length: usize,
    first: usize,
    count: usize,
}

impl Pending {
    fn new(first: usize) -> Self {
        let statement = sql::insert_prefix().to_string();
        let length = statement.chars().count();
        Self {
            statement,
            length,
            first,
            count: 0,
        }
    }

    /// Characters the statement would have with `fragment_len` appended,
    /// including the terminating `;`.
    fn length_with(&self, fragment_len: usize) -> usize {
        let separator = usize::from(self.count > 0);
        self.length + separator + fragment_len + 1
    }

    fn push(&mut self, fragment: &str, fragment_len: usize) {
        if self.count > 0 {
            self.statement.push('\n');
            self.length += 1;
        }
        self.statement.push_str(fragment);
        self.length += fragment_len;
        self.count += 1;
    }
}

impl<'a> BatchChunker<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        detector: &'a CoercionDetector,
        max_attempts: u32,
        max_sql_length: usize,
    ) -> Self {
        Self {
            transport,
            detector,
            healer: SchemaHealer::new(transport, max_attempts),
            max_sql_length,
        }
    }

    /// Insert every record, packing as many as fit into each statement.
    pub fn insert_many(&self, records: &[Table]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        if records.is_empty() {
            warn!("batch insert called with no records");
            return Ok(report);
        }

        let default_db = self.transport.default_database();
        let mut pending = Pending::new(0);

        for (index, record) in records.iter().enumerate() {
            if let Err(err) = self.admit(record) {
                warn!(record = index, inserted = report.inserted, error = %err, "batch stopped by invalid record");
                return Err(err);
            }

            let fragment = sql::insert_fragment(record, default_db);
            let fragment_len = fragment.chars().count();

            if pending.count > 0 && pending.length_with(fragment_len) > self.max_sql_length {
                self.flush(records, pending, &mut report)?;
                pending = Pending::new(index);
            }
            if pending.count == 0 && pending.length_with(fragment_len) > self.max_sql_length {
                warn!(record = index, fragment_len, max = self.max_sql_length, "single record exceeds statement limit");
            }
            pending.push(&fragment, fragment_len);
        }

        if pending.count > 0 {
            self.flush(records, pending, &mut report)?;
        }

        info!(
            records = records.len(),
            inserted = report.inserted,
            chunks = report.chunks,
            degraded = report.degraded_chunks,
            "batch insert complete"
        );
        Ok(report)
    }

    fn admit(&self, record: &Table) -> Result<()> {
        record.validate()?;
        self.detector.inspect(record)?;
        Ok(())
    }

    fn flush(&self, records: &[Table], mut pending: Pending, report: &mut BatchReport) -> Result<()> {
        pending.statement.push(';');
        report.chunks += 1;
        debug!(chunk = report.chunks, rows = pending.count, sql_len = pending.length + 1, "sending chunk");

        let err = match self.transport.execute(&pending.statement) {
            Ok(()) => {
                report.inserted += pending.count;
                return Ok(());
            }
            Err(err) => err,
        };

        report.degraded_chunks += 1;
        warn!(
            chunk = report.chunks,
            rows = pending.count,
            kind = %err.kind(),
            error = %err,
            "chunk insert failed, retrying rows individually; rows already applied by the server may be duplicated"
        );

        let chunk = &records[pending.first..pending.first + pending.count];
        let mut first_failure: Option<(usize, Error)> = None;
        for (offset, record) in chunk.iter().enumerate() {
            let index = pending.first + offset;
            match self.healer.insert(record) {
                Ok(_) => report.inserted += 1,
                Err(e) => {
                    warn!(record = index, error = %e, "row insert failed during degraded chunk");
                    if first_failure.is_none() {
                        first_failure = Some((index, e));
                    }
                }
            }
        }

        match first_failure {
            None => Ok(()),
            Some((failed_at, source)) => Err(Error::BatchInsertFailed {
                inserted: report.inserted,
                failed_at,
                source: Box::new(source),
            }),
        }
    }
}
