use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{AccessError, Result};

/// Cooperative cancellation flag shared between a caller and the scopes and
/// streams it started.
///
/// Cloning yields a handle to the same flag. Cancellation is sticky: once
/// set, the token never resets.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every operation observing this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Fails with [`AccessError::Cancelled`] if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AccessError::Cancelled)
        } else {
            Ok(())
        }
    }
}
