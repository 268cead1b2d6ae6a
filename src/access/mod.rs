//! Resilience layers wrapped around data-source operations.
//!
//! Each layer is a plain function or object and composes by nesting:
//!
//! ```no_run
//! use rowguard::access::{with_connection, with_transaction};
//! use rowguard::{Connection, Query, SqliteSource};
//!
//! let source = SqliteSource::new("users.db");
//! let updated = with_connection(&source, |conn| {
//!     with_transaction(conn, |conn| {
//!         conn.execute(&Query::with_params(
//!             "UPDATE user_data SET age = ? WHERE user_id = ?",
//!             [rowguard::Value::Integer(37), rowguard::Value::from("u-1")],
//!         ))
//!     })
//! })?;
//! # Ok::<(), rowguard::AccessError>(())
//! ```
//!
//! [`Pipeline`] stacks every layer in the usual order.

mod cache;
mod concurrent;
mod connection;
mod execute;
mod log;
mod pipeline;
mod retry;
mod transaction;

pub use cache::{CacheStats, ResultCache};
pub use concurrent::fetch_concurrently;
pub use connection::{with_connection, with_connection_cancellable};
pub use execute::{execute_query, execute_statement};
pub use log::logged;
pub use pipeline::Pipeline;
pub use retry::RetryPolicy;
pub use transaction::{with_transaction, with_transaction_observed, Transaction, TxState};
