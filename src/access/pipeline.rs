use std::sync::Arc;

use crate::access::cache::ResultCache;
use crate::access::connection::with_connection_cancellable;
use crate::access::log::logged;
use crate::access::retry::RetryPolicy;
use crate::access::transaction::with_transaction_observed;
use crate::observe::{AccessObserver, NOOP};
use crate::primitives::concurrency::CancelToken;
use crate::source::{Connection, DataSource};
use crate::types::{Query, Result, Row};

/// Composes the access layers around a data source.
///
/// Layers apply outermost first: connection scope, transaction, retry, cache,
/// query log. Retries reuse the scope's connection and, when transactional,
/// run inside the same transaction. Every layer except the connection scope is
/// opt-in.
///
/// ```no_run
/// use rowguard::{Pipeline, Query, ResultCache, RetryPolicy, SqliteSource};
///
/// let source = SqliteSource::new("users.db");
/// let cache = ResultCache::new();
/// let rows = Pipeline::new(&source)
///     .retry(RetryPolicy::default())
///     .cache(&cache)
///     .fetch(&Query::new("SELECT name FROM user_data"))?;
/// # Ok::<(), rowguard::AccessError>(())
/// ```
pub struct Pipeline<'a, S: DataSource> {
    source: &'a S,
    transactional: bool,
    retry: Option<RetryPolicy>,
    cache: Option<&'a ResultCache>,
    observer: &'a dyn AccessObserver,
    cancel: CancelToken,
}

impl<'a, S: DataSource> Pipeline<'a, S> {
    /// Starts a pipeline that only scopes connections.
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            transactional: false,
            retry: None,
            cache: None,
            observer: &NOOP,
            cancel: CancelToken::new(),
        }
    }

    /// Runs each operation inside a transaction.
    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    /// Retries transient failures with `policy`.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Serves [`fetch`](Self::fetch) results from `cache`.
    pub fn cache(mut self, cache: &'a ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Reports layer events to `observer`.
    pub fn observer(mut self, observer: &'a dyn AccessObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Stops before acquiring a connection or starting an attempt once
    /// `token` is cancelled.
    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs `op` inside the scope, transaction and retry layers.
    ///
    /// `op` may be called more than once when retry is enabled. When
    /// transactional, the cancel token is checked again before commit and a
    /// cancellation rolls the transaction back.
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(&mut S::Conn) -> Result<T>,
    {
        with_connection_cancellable(self.source, &self.cancel, |conn| {
            if self.transactional {
                with_transaction_observed(conn, self.observer, |conn| {
                    let value = self.attempt(conn, &mut op)?;
                    self.cancel.check()?;
                    Ok(value)
                })
            } else {
                self.attempt(conn, &mut op)
            }
        })
    }

    /// Fetches every row of `query` through all configured layers.
    pub fn fetch(&self, query: &Query) -> Result<Arc<Vec<Row>>> {
        self.run(|conn| match self.cache {
            Some(cache) => cache.get_or_compute(query, self.observer, || self.load(conn, query)),
            None => self.load(conn, query).map(Arc::new),
        })
    }

    /// Executes a statement through every layer except the cache.
    pub fn execute(&self, query: &Query) -> Result<usize> {
        self.run(|conn| logged(query, self.observer, || conn.execute(query)))
    }

    fn attempt<T, F>(&self, conn: &mut S::Conn, op: &mut F) -> Result<T>
    where
        F: FnMut(&mut S::Conn) -> Result<T>,
    {
        match &self.retry {
            Some(policy) => policy.run(self.observer, || {
                self.cancel.check()?;
                op(&mut *conn)
            }),
            None => op(conn),
        }
    }

    fn load(&self, conn: &mut S::Conn, query: &Query) -> Result<Vec<Row>> {
        logged(query, self.observer, || conn.query_all(query))
    }
}
