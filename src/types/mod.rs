#![forbid(unsafe_code)]

//! Core value types and the error taxonomy shared by every layer.

mod query;
mod value;

pub use query::{PageWindow, Query};
pub use value::{Row, Value};

use thiserror::Error;

/// Coarse classification of an [`AccessError`], used by the retry layer to
/// decide whether another attempt is worthwhile.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Acquiring or releasing a connection failed.
    Connection,
    /// A failure that may succeed if the operation is repeated.
    Transient,
    /// A failure that will repeat on every attempt.
    Fatal,
    /// An aggregate was requested over a stream without rows.
    EmptyStream,
    /// The operation observed a cancelled token.
    Cancelled,
    /// The caller supplied an unusable argument.
    InvalidArgument,
}

/// Errors surfaced by the data-access layer.
///
/// The type is `Clone + PartialEq` so callers and tests can check that the
/// error returned by a wrapping layer is exactly the one raised underneath.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AccessError {
    /// Acquiring or releasing a connection failed.
    #[error("connection error: {0}")]
    Connection(String),
    /// Retry candidate such as a lock timeout or a dropped link.
    #[error("transient query error: {0}")]
    Transient(String),
    /// Malformed statement, constraint violation, or similar.
    #[error("query error: {0}")]
    Fatal(String),
    /// Aggregation over zero rows.
    #[error("stream produced no rows")]
    EmptyStream,
    /// A [`CancelToken`](crate::primitives::concurrency::CancelToken) fired.
    #[error("operation cancelled")]
    Cancelled,
    /// Invalid argument supplied by the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Result alias for data-access operations.
pub type Result<T> = std::result::Result<T, AccessError>;

impl AccessError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Connection(_) => ErrorKind::Connection,
            AccessError::Transient(_) => ErrorKind::Transient,
            AccessError::Fatal(_) => ErrorKind::Fatal,
            AccessError::EmptyStream => ErrorKind::EmptyStream,
            AccessError::Cancelled => ErrorKind::Cancelled,
            AccessError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Whether repeating the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn connection(message: impl Into<String>) -> Self {
        AccessError::Connection(message.into())
    }

    pub(crate) fn fatal(message: impl Into<String>) -> Self {
        AccessError::Fatal(message.into())
    }
}
