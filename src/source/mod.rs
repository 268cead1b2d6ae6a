//! Driver seam between the access layers and a concrete SQL engine.
//!
//! A driver exposes four capabilities: opening and closing connections,
//! executing a parameterized statement for an affected-row count, iterating
//! the rows of a parameterized statement, and begin/commit/rollback. Placeholder
//! syntax and transaction statements are the driver's business.

pub mod sqlite;

pub use sqlite::{SqliteConnection, SqliteOptions, SqliteSource};

use crate::types::{PageWindow, Query, Result, Row};

/// Factory for connections to one data source.
///
/// Sources are shared between threads; each connection they hand out is
/// owned by exactly one scope at a time.
pub trait DataSource: Send + Sync {
    /// Connection type produced by this source.
    type Conn: Connection;

    /// Opens a new connection.
    fn connect(&self) -> Result<Self::Conn>;
}

/// A live link to the data source.
///
/// Implementations must release the underlying link when dropped, so that a
/// connection abandoned by unwinding is still closed. [`Connection::close`]
/// is the explicit release and reports failures.
pub trait Connection {
    /// Prepared statement borrowing this connection.
    type Statement<'c>: Statement
    where
        Self: 'c;

    /// Executes a statement and returns the number of affected rows.
    fn execute(&mut self, query: &Query) -> Result<usize>;

    /// Prepares a row-returning statement with its parameters.
    fn prepare<'c>(&'c mut self, query: &Query) -> Result<Self::Statement<'c>>;

    /// Starts a transaction.
    fn begin(&mut self) -> Result<()>;

    /// Commits the current transaction.
    fn commit(&mut self) -> Result<()>;

    /// Rolls back the current transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Releases the connection.
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Runs `query` and materializes every row.
    fn query_all(&mut self, query: &Query) -> Result<Vec<Row>> {
        let mut statement = self.prepare(query)?;
        let mut cursor = statement.query()?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Fetches a single page of `query`.
    ///
    /// The default appends `LIMIT ? OFFSET ?`; drivers for engines with other
    /// paging syntax override this.
    fn fetch_page(&mut self, query: &Query, window: PageWindow) -> Result<Vec<Row>> {
        self.query_all(&query.windowed(window)?)
    }
}

/// A prepared statement that can open a cursor over its rows.
pub trait Statement {
    /// Cursor type borrowing this statement.
    type Rows<'s>: RowCursor
    where
        Self: 's;

    /// Binds the parameters and opens a cursor.
    fn query<'s>(&'s mut self) -> Result<Self::Rows<'s>>;
}

/// Server-side cursor producing one row per call.
///
/// The cursor is released when dropped.
pub trait RowCursor {
    /// Fetches the next row, or `None` once the result set is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;
}
