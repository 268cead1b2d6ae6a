//! Bounded-memory consumption of large result sets.
//!
//! [`RowStream`] pulls one row per step from a driver cursor. Batching,
//! filtering and averaging are adapters over any `Iterator<Item = Result<T>>`,
//! so they compose with a row stream, a [`LazyPaginator`] or plain vectors.

mod aggregate;
mod batch;
mod paginate;
mod rows;

pub use aggregate::{numeric_field, streaming_average, RunningMean};
pub use batch::{filter_batches, stream_batches, Batches, FilterBatches};
pub use paginate::{paginate, LazyPaginator};
pub use rows::{stream_query, stream_rows, RowStream};
