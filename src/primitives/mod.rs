//! Low-level primitives shared by the access layers and streams.

/// Concurrency primitives and cancellation.
///
/// Thread-safe flags used to stop scopes and streams cooperatively.
pub mod concurrency;
