use std::time::Instant;

use tracing::{debug, info};

use crate::observe::AccessObserver;
use crate::types::{Query, Result};

/// Announces `query` before running `op` and records how it ended.
///
/// The statement text and parameter count are logged at `info`; bound values
/// only at `debug`.
pub fn logged<T, F>(query: &Query, observer: &dyn AccessObserver, op: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    info!(
        sql = query.sql(),
        params = query.params().len(),
        "executing query"
    );
    debug!(params = ?query.params(), "query parameters");
    observer.query_started(query);
    let started = Instant::now();
    let result = op();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(sql = query.sql(), elapsed_ms, "query finished"),
        Err(err) => debug!(sql = query.sql(), elapsed_ms, error = %err, "query failed"),
    }
    result
}
