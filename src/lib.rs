//! Resilient data access over SQL sources.
//!
//! `rowguard` wraps data-source operations in composable layers: a scoped
//! connection that is always released, a transaction that commits or rolls
//! back, bounded retry for transient failures, and a result cache. Large
//! result sets are consumed through lazy row streams, batches, pagination
//! and single-pass aggregates.
//!
//! ```no_run
//! use rowguard::stream::{numeric_field, streaming_average, stream_query};
//! use rowguard::{CancelToken, Query, SqliteSource};
//!
//! let source = SqliteSource::new("users.db");
//! let average_age = stream_query(
//!     &source,
//!     &Query::new("SELECT age FROM user_data"),
//!     &CancelToken::new(),
//!     |rows| streaming_average(rows, numeric_field("age")),
//! )?;
//! # Ok::<(), rowguard::AccessError>(())
//! ```

#![warn(missing_docs)]

pub mod access;
pub mod cli;
pub mod config;
pub mod observe;
pub mod primitives;
pub mod source;
pub mod stream;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod types;

pub use access::{Pipeline, ResultCache, RetryPolicy, Transaction, TxState};
pub use config::{AccessOptions, ConfigError};
pub use observe::{AccessMetrics, AccessObserver, CacheOutcome, NoopObserver};
pub use primitives::concurrency::CancelToken;
pub use source::{Connection, DataSource, SqliteSource};
pub use types::{AccessError, ErrorKind, PageWindow, Query, Result, Row, Value};
