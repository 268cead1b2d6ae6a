use tracing::{debug, warn};

use crate::primitives::concurrency::CancelToken;
use crate::source::{Connection, DataSource};
use crate::types::{AccessError, Result};

/// Runs `op` with a freshly acquired connection and releases it afterwards.
///
/// Exactly one connection is opened and closed per call. If `op` fails, its
/// error is returned and a release failure is only logged. If `op` succeeds
/// but the release fails, the release failure is returned as a connection
/// error. A panic inside `op` drops the connection, which releases it.
///
/// Acquisition failures are returned as [`AccessError::Connection`] and are
/// never retried here.
pub fn with_connection<S, T, F>(source: &S, op: F) -> Result<T>
where
    S: DataSource,
    F: FnOnce(&mut S::Conn) -> Result<T>,
{
    let mut conn = acquire(source)?;
    let result = op(&mut conn);
    release(conn, result)
}

/// Like [`with_connection`], but refuses to start once `token` is cancelled.
///
/// A result `op` has already produced is returned as is, since it may reflect
/// committed work. `op` observes the same token (for example through a
/// [`RowStream`](crate::stream::RowStream)) to stop early.
pub fn with_connection_cancellable<S, T, F>(source: &S, token: &CancelToken, op: F) -> Result<T>
where
    S: DataSource,
    F: FnOnce(&mut S::Conn) -> Result<T>,
{
    token.check()?;
    let mut conn = acquire(source)?;
    let result = op(&mut conn);
    release(conn, result)
}

fn acquire<S: DataSource>(source: &S) -> Result<S::Conn> {
    let conn = source.connect().map_err(|err| match err {
        AccessError::Connection(_) => err,
        other => AccessError::Connection(other.to_string()),
    })?;
    debug!("connection acquired");
    Ok(conn)
}

fn release<C: Connection, T>(conn: C, result: Result<T>) -> Result<T> {
    match (conn.close(), result) {
        (Ok(()), result) => {
            debug!(ok = result.is_ok(), "connection released");
            result
        }
        (Err(close_err), Ok(_)) => Err(match close_err {
            AccessError::Connection(_) => close_err,
            other => AccessError::Connection(other.to_string()),
        }),
        (Err(close_err), Err(err)) => {
            warn!(error = %close_err, cause = %err, "connection release failed after operation error");
            Err(err)
        }
    }
}
