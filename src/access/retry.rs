use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use crate::observe::AccessObserver;
use crate::types::{AccessError, Result};

/// Bounded retry with a fixed delay between attempts.
///
/// Only [transient](AccessError::is_transient) failures are retried.
/// `max_attempts` counts every try including the first. The delay is a fixed
/// interval; `jitter` adds a random extra pause in `[0, jitter)` and is zero
/// by default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
    /// Upper bound of random extra pause added to `delay`.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy without jitter.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            jitter: Duration::ZERO,
        }
    }

    /// Adds random jitter to every pause.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent, sleeping the calling thread between attempts.
    ///
    /// Every failed attempt is reported to `observer` before the next one
    /// starts. The error of the last attempt is returned unchanged.
    pub fn run<T, F>(&self, observer: &dyn AccessObserver, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        self.validate()?;
        let mut attempt = 1;
        loop {
            let err = match op() {
                Ok(value) => {
                    self.log_success(attempt);
                    return Ok(value);
                }
                Err(err) => err,
            };
            let pause = self.after_failure(observer, attempt, err)?;
            std::thread::sleep(pause);
            attempt += 1;
        }
    }

    /// Async form of [`run`](Self::run) that waits on a tokio timer instead of
    /// blocking the thread. Attempt counting and reporting are identical.
    pub async fn run_async<T, F, Fut>(&self, observer: &dyn AccessObserver, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.validate()?;
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => {
                    self.log_success(attempt);
                    return Ok(value);
                }
                Err(err) => err,
            };
            let pause = self.after_failure(observer, attempt, err)?;
            tokio::time::sleep(pause).await;
            attempt += 1;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AccessError::InvalidArgument("max_attempts must be at least 1"));
        }
        Ok(())
    }

    fn log_success(&self, attempt: u32) {
        if attempt > 1 {
            info!(attempt, "operation succeeded after retry");
        }
    }

    /// Reports a failed attempt and either returns the pause before the next
    /// attempt or hands the error back when no further attempt is allowed.
    fn after_failure(
        &self,
        observer: &dyn AccessObserver,
        attempt: u32,
        err: AccessError,
    ) -> Result<Duration> {
        observer.attempt_failed(attempt, self.max_attempts, &err);
        if !err.is_transient() {
            warn!(attempt, error = %err, "attempt failed with non-retryable error");
            return Err(err);
        }
        if attempt >= self.max_attempts {
            error!(
                attempts = self.max_attempts,
                error = %err,
                "all attempts failed"
            );
            return Err(err);
        }
        let pause = self.pause();
        warn!(
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = pause.as_millis() as u64,
            error = %err,
            "attempt failed; retrying"
        );
        Ok(pause)
    }

    fn pause(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        self.delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}
