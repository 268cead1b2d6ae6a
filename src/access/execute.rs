use crate::access::connection::with_connection;
use crate::access::log::logged;
use crate::observe::NOOP;
use crate::source::{Connection, DataSource};
use crate::types::{Query, Result, Row};

/// Opens a connection, runs `query`, materializes every row and closes.
pub fn execute_query<S: DataSource>(source: &S, query: &Query) -> Result<Vec<Row>> {
    with_connection(source, |conn| logged(query, &NOOP, || conn.query_all(query)))
}

/// Opens a connection, runs a statement and returns the affected-row count.
pub fn execute_statement<S: DataSource>(source: &S, query: &Query) -> Result<usize> {
    with_connection(source, |conn| logged(query, &NOOP, || conn.execute(query)))
}
