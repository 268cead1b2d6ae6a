use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::access::execute::execute_query;
use crate::source::DataSource;
use crate::types::{AccessError, Query, Result, Row};

/// Runs independent queries on blocking worker tasks, one connection each.
///
/// Results come back in the order of `queries`. When several queries fail,
/// the failure of the earliest one in that order is returned; the remaining
/// workers still finish and release their connections.
pub async fn fetch_concurrently<S>(source: Arc<S>, queries: Vec<Query>) -> Result<Vec<Vec<Row>>>
where
    S: DataSource + 'static,
{
    debug!(queries = queries.len(), "spawning concurrent fetches");
    let handles: Vec<JoinHandle<Result<Vec<Row>>>> = queries
        .into_iter()
        .map(|query| {
            let source = Arc::clone(&source);
            tokio::task::spawn_blocking(move || execute_query(source.as_ref(), &query))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(
            handle
                .await
                .map_err(|err| AccessError::fatal(format!("fetch worker failed: {err}")))
                .and_then(|rows| rows),
        );
    }
    outcomes.into_iter().collect()
}
