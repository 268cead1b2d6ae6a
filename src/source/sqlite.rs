use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, ErrorCode, OpenFlags, ToSql};
use tracing::debug;

use super::{Connection, DataSource, RowCursor, Statement};
use crate::types::{AccessError, Query, Result, Row, Value};

/// Options applied to every SQLite connection a [`SqliteSource`] opens.
#[derive(Clone, Debug)]
pub struct SqliteOptions {
    /// How long a statement waits on a locked database before failing with a
    /// transient error.
    pub busy_timeout: Duration,
    /// Open the database read-only.
    pub read_only: bool,
    /// Create the database file when it does not exist.
    pub create_if_missing: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            read_only: false,
            create_if_missing: true,
        }
    }
}

/// [`DataSource`] backed by a SQLite database file.
#[derive(Clone, Debug)]
pub struct SqliteSource {
    path: PathBuf,
    options: SqliteOptions,
}

impl SqliteSource {
    /// Creates a source for the database at `path` with default options.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_options(path, SqliteOptions::default())
    }

    /// Creates a source for the database at `path`.
    pub fn with_options(path: impl AsRef<Path>, options: SqliteOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
        }
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.options.read_only {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
            if self.options.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
        }
        flags
    }
}

impl DataSource for SqliteSource {
    type Conn = SqliteConnection;

    fn connect(&self) -> Result<SqliteConnection> {
        let conn = rusqlite::Connection::open_with_flags(&self.path, self.open_flags())
            .map_err(|err| {
                AccessError::connection(format!("open {}: {err}", self.path.display()))
            })?;
        conn.busy_timeout(self.options.busy_timeout)
            .map_err(|err| AccessError::connection(err.to_string()))?;
        debug!(path = %self.path.display(), "sqlite connection opened");
        Ok(SqliteConnection { conn })
    }
}

/// Connection to a SQLite database. Dropping it closes the handle.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Wraps an already-open rusqlite connection.
    pub fn from_raw(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }
}

impl Connection for SqliteConnection {
    type Statement<'c> = SqliteStatement<'c>;

    fn execute(&mut self, query: &Query) -> Result<usize> {
        self.conn
            .execute(query.sql(), params_from_iter(query.params().iter()))
            .map_err(classify)
    }

    fn prepare<'c>(&'c mut self, query: &Query) -> Result<SqliteStatement<'c>> {
        let stmt = self.conn.prepare(query.sql()).map_err(classify)?;
        Ok(SqliteStatement {
            stmt,
            params: query.params().to_vec(),
        })
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN").map_err(classify)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT").map_err(classify)
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK").map_err(classify)
    }

    fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, err)| AccessError::connection(format!("close: {err}")))?;
        debug!("sqlite connection closed");
        Ok(())
    }
}

/// Prepared SQLite statement with its bound parameters.
pub struct SqliteStatement<'c> {
    stmt: rusqlite::Statement<'c>,
    params: Vec<Value>,
}

impl Statement for SqliteStatement<'_> {
    type Rows<'s> = SqliteRows<'s> where Self: 's;

    fn query<'s>(&'s mut self) -> Result<SqliteRows<'s>> {
        let columns: Vec<String> = self
            .stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let rows = self
            .stmt
            .query(params_from_iter(self.params.iter()))
            .map_err(classify)?;
        Ok(SqliteRows {
            rows,
            columns: columns.into(),
        })
    }
}

/// Open SQLite cursor. Each [`RowCursor::next_row`] steps the statement once.
pub struct SqliteRows<'s> {
    rows: rusqlite::Rows<'s>,
    columns: Arc<[String]>,
}

impl RowCursor for SqliteRows<'_> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.rows.next().map_err(classify)? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(self.columns.len());
        for idx in 0..self.columns.len() {
            values.push(from_sql(row.get_ref(idx).map_err(classify)?));
        }
        Ok(Some(Row::new(Arc::clone(&self.columns), values)))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// Maps a SQLite failure onto the access error taxonomy.
///
/// Busy and locked databases, I/O hiccups and schema changes are transient;
/// open failures are connection errors; everything else is fatal.
pub fn classify(err: rusqlite::Error) -> AccessError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
        _ => None,
    };
    match code {
        Some(ErrorCode::DatabaseBusy)
        | Some(ErrorCode::DatabaseLocked)
        | Some(ErrorCode::SystemIoFailure)
        | Some(ErrorCode::SchemaChanged) => AccessError::Transient(err.to_string()),
        Some(ErrorCode::CannotOpen) | Some(ErrorCode::NotADatabase) => {
            AccessError::connection(err.to_string())
        }
        _ => AccessError::fatal(err.to_string()),
    }
}
