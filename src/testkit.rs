//! In-memory data source for exercising the access layers without a database.
//!
//! [`FakeSource`] serves a fixed table for every row-returning statement and
//! counts each physical operation so tests can assert on connection, cursor
//! and transaction lifecycles. Failures can be injected per operation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::access::TxState;
use crate::observe::{AccessObserver, CacheOutcome};
use crate::source::{Connection, DataSource, RowCursor, Statement};
use crate::types::{AccessError, PageWindow, Query, Result, Row, Value};

/// Counter values captured by [`FakeSource::stats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FakeStats {
    /// Connections opened.
    pub opens: usize,
    /// Connections released, explicitly or by drop.
    pub closes: usize,
    /// Cursors opened.
    pub cursors_opened: usize,
    /// Cursors released.
    pub cursors_closed: usize,
    /// Single-row fetches issued against cursors.
    pub row_fetches: usize,
    /// Statements executed for an affected-row count.
    pub executes: usize,
    /// Transactions begun.
    pub begins: usize,
    /// Transactions committed.
    pub commits: usize,
    /// Transactions rolled back.
    pub rollbacks: usize,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    cursors_opened: AtomicUsize,
    cursors_closed: AtomicUsize,
    row_fetches: AtomicUsize,
    executes: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

#[derive(Default)]
struct Faults {
    connect: Option<AccessError>,
    close: Option<AccessError>,
    commit: Option<AccessError>,
    rollback: Option<AccessError>,
    statements: VecDeque<AccessError>,
    cursor_fail_at: Option<(usize, AccessError)>,
}

struct Inner {
    table: Vec<Row>,
    counters: Counters,
    faults: Mutex<Faults>,
    queries: Mutex<Vec<Query>>,
    windows: Mutex<Vec<PageWindow>>,
}

/// Fake [`DataSource`] over a fixed in-memory table.
#[derive(Clone)]
pub struct FakeSource {
    inner: Arc<Inner>,
}

impl FakeSource {
    /// Creates a source whose every query returns `table`.
    pub fn new(table: Vec<Row>) -> Self {
        Self {
            inner: Arc::new(Inner {
                table,
                counters: Counters::default(),
                faults: Mutex::new(Faults::default()),
                queries: Mutex::new(Vec::new()),
                windows: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a `user_data`-shaped table with one row per age.
    pub fn with_ages(ages: &[i64]) -> Self {
        let columns: Arc<[String]> = vec![
            "user_id".to_string(),
            "name".to_string(),
            "age".to_string(),
        ]
        .into();
        let table = ages
            .iter()
            .enumerate()
            .map(|(idx, age)| {
                Row::new(
                    Arc::clone(&columns),
                    vec![
                        Value::Text(format!("user-{idx}")),
                        Value::Text(format!("User {idx}")),
                        Value::Integer(*age),
                    ],
                )
            })
            .collect();
        Self::new(table)
    }

    /// Copies the current counters.
    pub fn stats(&self) -> FakeStats {
        let c = &self.inner.counters;
        FakeStats {
            opens: c.opens.load(Ordering::SeqCst),
            closes: c.closes.load(Ordering::SeqCst),
            cursors_opened: c.cursors_opened.load(Ordering::SeqCst),
            cursors_closed: c.cursors_closed.load(Ordering::SeqCst),
            row_fetches: c.row_fetches.load(Ordering::SeqCst),
            executes: c.executes.load(Ordering::SeqCst),
            begins: c.begins.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
        }
    }

    /// Statements prepared or executed so far, in order.
    pub fn queries(&self) -> Vec<Query> {
        self.inner.queries.lock().clone()
    }

    /// Page windows fetched so far, in order.
    pub fn page_windows(&self) -> Vec<PageWindow> {
        self.inner.windows.lock().clone()
    }

    /// Makes every following `connect` fail with `err`.
    pub fn fail_connect(&self, err: AccessError) {
        self.inner.faults.lock().connect = Some(err);
    }

    /// Makes every following explicit `close` fail with `err`. The link is
    /// still counted as released.
    pub fn fail_close(&self, err: AccessError) {
        self.inner.faults.lock().close = Some(err);
    }

    /// Makes every following `commit` fail with `err`.
    pub fn fail_commit(&self, err: AccessError) {
        self.inner.faults.lock().commit = Some(err);
    }

    /// Makes every following `rollback` fail with `err`. The rollback is
    /// still counted.
    pub fn fail_rollback(&self, err: AccessError) {
        self.inner.faults.lock().rollback = Some(err);
    }

    /// Queues a failure for the next statement prepared, executed or paged.
    /// Queued failures are consumed one per statement.
    pub fn push_statement_failure(&self, err: AccessError) {
        self.inner.faults.lock().statements.push_back(err);
    }

    /// Makes cursors fail with `err` when asked for the row at `index`.
    pub fn fail_cursor_at(&self, index: usize, err: AccessError) {
        self.inner.faults.lock().cursor_fail_at = Some((index, err));
    }

    fn record(&self, query: &Query) -> Result<()> {
        self.inner.queries.lock().push(query.clone());
        match self.inner.faults.lock().statements.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl DataSource for FakeSource {
    type Conn = FakeConnection;

    fn connect(&self) -> Result<FakeConnection> {
        if let Some(err) = self.inner.faults.lock().connect.clone() {
            return Err(err);
        }
        bump(&self.inner.counters.opens);
        Ok(FakeConnection {
            source: self.clone(),
            released: false,
        })
    }
}

/// Connection handed out by [`FakeSource`].
pub struct FakeConnection {
    source: FakeSource,
    released: bool,
}

impl FakeConnection {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            bump(&self.source.inner.counters.closes);
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.release();
    }
}

impl Connection for FakeConnection {
    type Statement<'c> = FakeStatement<'c>;

    fn execute(&mut self, query: &Query) -> Result<usize> {
        self.source.record(query)?;
        bump(&self.source.inner.counters.executes);
        Ok(1)
    }

    fn prepare<'c>(&'c mut self, query: &Query) -> Result<FakeStatement<'c>> {
        self.source.record(query)?;
        Ok(FakeStatement {
            source: &self.source,
        })
    }

    fn begin(&mut self) -> Result<()> {
        bump(&self.source.inner.counters.begins);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(err) = self.source.inner.faults.lock().commit.clone() {
            return Err(err);
        }
        bump(&self.source.inner.counters.commits);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        bump(&self.source.inner.counters.rollbacks);
        match self.source.inner.faults.lock().rollback.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn close(mut self) -> Result<()> {
        self.release();
        match self.source.inner.faults.lock().close.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fetch_page(&mut self, query: &Query, window: PageWindow) -> Result<Vec<Row>> {
        self.source.record(&query.windowed(window)?)?;
        self.source.inner.windows.lock().push(window);
        let table = &self.source.inner.table;
        let start = window.offset.min(table.len());
        let end = window.offset.saturating_add(window.page_size).min(table.len());
        Ok(table[start..end].to_vec())
    }
}

/// Statement prepared by [`FakeConnection`].
pub struct FakeStatement<'c> {
    source: &'c FakeSource,
}

impl Statement for FakeStatement<'_> {
    type Rows<'s> = FakeRows<'s> where Self: 's;

    fn query<'s>(&'s mut self) -> Result<FakeRows<'s>> {
        bump(&self.source.inner.counters.cursors_opened);
        Ok(FakeRows {
            source: self.source,
            position: 0,
        })
    }
}

/// Cursor over the fake table. Counts a release when dropped.
pub struct FakeRows<'s> {
    source: &'s FakeSource,
    position: usize,
}

impl RowCursor for FakeRows<'_> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        bump(&self.source.inner.counters.row_fetches);
        if let Some((index, err)) = &self.source.inner.faults.lock().cursor_fail_at {
            if *index == self.position {
                return Err(err.clone());
            }
        }
        let row = self.source.inner.table.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }
}

impl Drop for FakeRows<'_> {
    fn drop(&mut self) {
        bump(&self.source.inner.counters.cursors_closed);
    }
}

/// One event captured by [`RecordingObserver`].
#[derive(Clone, Debug, PartialEq)]
pub enum ObservedEvent {
    /// A statement started.
    QueryStarted(Query),
    /// A retry attempt failed.
    AttemptFailed {
        /// 1-based attempt number.
        attempt: u32,
        /// Configured attempt budget.
        max_attempts: u32,
        /// Failure reported for the attempt.
        error: AccessError,
    },
    /// A cache lookup completed.
    CacheLookup(Query, CacheOutcome),
    /// A transaction finished.
    TransactionFinished(TxState),
}

/// Observer that keeps every event in order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the recorded events.
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    /// Failed attempts as `(attempt, error)` pairs.
    pub fn failed_attempts(&self) -> Vec<(u32, AccessError)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::AttemptFailed { attempt, error, .. } => {
                    Some((*attempt, error.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Cache outcomes in lookup order.
    pub fn cache_outcomes(&self) -> Vec<CacheOutcome> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::CacheLookup(_, outcome) => Some(*outcome),
                _ => None,
            })
            .collect()
    }
}

impl AccessObserver for RecordingObserver {
    fn query_started(&self, query: &Query) {
        self.events
            .lock()
            .push(ObservedEvent::QueryStarted(query.clone()));
    }

    fn attempt_failed(&self, attempt: u32, max_attempts: u32, error: &AccessError) {
        self.events.lock().push(ObservedEvent::AttemptFailed {
            attempt,
            max_attempts,
            error: error.clone(),
        });
    }

    fn cache_lookup(&self, query: &Query, outcome: CacheOutcome) {
        self.events
            .lock()
            .push(ObservedEvent::CacheLookup(query.clone(), outcome));
    }

    fn transaction_finished(&self, state: TxState) {
        self.events
            .lock()
            .push(ObservedEvent::TransactionFinished(state));
    }
}
