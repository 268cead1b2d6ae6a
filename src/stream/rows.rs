use std::iter::FusedIterator;

use tracing::debug;

use crate::access::with_connection_cancellable;
use crate::primitives::concurrency::CancelToken;
use crate::source::{Connection, DataSource, RowCursor, Statement};
use crate::types::{AccessError, Query, Result, Row};

/// Lazy iterator over the rows of an open cursor.
///
/// Each call to `next` fetches at most one row from the driver. The stream
/// ends for good after the result set is exhausted, after the first error,
/// after [`close`](Self::close), or once its [`CancelToken`] fires; in the
/// last case a single [`AccessError::Cancelled`] is yielded first. The cursor
/// is released as soon as the stream ends or is dropped.
pub struct RowStream<R: RowCursor> {
    cursor: Option<R>,
    cancel: CancelToken,
    yielded: usize,
}

impl<R: RowCursor> RowStream<R> {
    /// Wraps an already open cursor.
    pub fn new(cursor: R, cancel: CancelToken) -> Self {
        Self {
            cursor: Some(cursor),
            cancel,
            yielded: 0,
        }
    }

    /// Opens a cursor on `statement`. Fails with `Cancelled` without touching
    /// the statement if `cancel` already fired.
    pub fn open<'s, S>(statement: &'s mut S, cancel: CancelToken) -> Result<Self>
    where
        S: Statement<Rows<'s> = R>,
    {
        cancel.check()?;
        let cursor = statement.query()?;
        debug!("row stream opened");
        Ok(Self::new(cursor, cancel))
    }

    /// Rows produced so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Whether the cursor has been released.
    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    /// Releases the cursor. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            debug!(rows = self.yielded, "row stream closed");
        }
    }
}

impl<R: RowCursor> Iterator for RowStream<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        if self.cancel.is_cancelled() {
            self.close();
            return Some(Err(AccessError::Cancelled));
        }
        match cursor.next_row() {
            Ok(Some(row)) => {
                self.yielded += 1;
                Some(Ok(row))
            }
            Ok(None) => {
                self.close();
                None
            }
            Err(err) => {
                self.close();
                Some(Err(err))
            }
        }
    }
}

impl<R: RowCursor> FusedIterator for RowStream<R> {}

impl<R: RowCursor> Drop for RowStream<R> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Streams the rows of `query` on `conn` into `consume`.
///
/// The statement and cursor live only for the duration of the call; the
/// cursor is released when `consume` returns, whether or not it read every
/// row.
pub fn stream_rows<C, T, F>(conn: &mut C, query: &Query, cancel: &CancelToken, consume: F) -> Result<T>
where
    C: Connection,
    F: FnOnce(&mut dyn Iterator<Item = Result<Row>>) -> Result<T>,
{
    let mut statement = conn.prepare(query)?;
    let mut stream = RowStream::open(&mut statement, cancel.clone())?;
    let result = consume(&mut stream);
    stream.close();
    result
}

/// [`stream_rows`] inside its own connection scope.
pub fn stream_query<S, T, F>(source: &S, query: &Query, cancel: &CancelToken, consume: F) -> Result<T>
where
    S: DataSource,
    F: FnOnce(&mut dyn Iterator<Item = Result<Row>>) -> Result<T>,
{
    with_connection_cancellable(source, cancel, |conn| {
        stream_rows(conn, query, cancel, consume)
    })
}
