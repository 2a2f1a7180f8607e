//! Retry execution with exponential backoff.
//!
//! [`RetryPolicy`] wraps any fallible async operation. Delays come from
//! [`RetryConfig`](crate::RetryConfig); whether a failure is worth another
//! attempt comes from [`SyncError::is_retryable`], optionally overridden per
//! call through [`RetryHooks`].

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::future::Future;

/// Counters accumulated across all operations run through one policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Operations that reached a terminal outcome (success or exhaustion).
    pub total_calls: u64,
    /// Operations that succeeded on the first attempt.
    pub first_try_successes: u64,
    /// Operations that succeeded after at least one retry.
    pub retried_successes: u64,
    /// Operations that failed terminally.
    pub final_failures: u64,
}

/// Per-call overrides for retry behavior.
#[derive(Default)]
pub struct RetryHooks<'a> {
    /// Replaces [`SyncError::is_retryable`] as the retry predicate. Receives
    /// the error and the 0-indexed attempt that just failed.
    pub should_retry: Option<&'a (dyn Fn(&SyncError, u32) -> bool + Send + Sync)>,
    /// Observes each failure that will be retried.
    pub on_retry: Option<&'a (dyn Fn(&SyncError, u32) + Send + Sync)>,
}

/// Runs operations with exponential backoff and jitter.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    stats: Mutex<RetryStats>,
}

impl RetryPolicy {
    /// Creates a policy from a retry configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    /// Returns the configuration this policy runs with.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns a snapshot of the accumulated counters.
    pub fn stats(&self) -> RetryStats {
        *self.stats.lock()
    }

    /// Runs `op` until it succeeds, fails non-retryably, or exhausts the
    /// attempt budget.
    ///
    /// A non-retryable error is returned as-is. An exhausted budget wraps the
    /// last error in [`SyncError::RetriesExhausted`] with `context`.
    pub async fn run<T, F, Fut>(&self, context: &str, op: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        self.run_with(context, op, RetryHooks::default()).await
    }

    /// Like [`run`](Self::run), with per-call hooks.
    pub async fn run_with<T, F, Fut>(
        &self,
        context: &str,
        mut op: F,
        hooks: RetryHooks<'_>,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    let mut stats = self.stats.lock();
                    stats.total_calls += 1;
                    if attempt == 0 {
                        stats.first_try_successes += 1;
                    } else {
                        stats.retried_successes += 1;
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = match hooks.should_retry {
                        Some(predicate) => predicate(&err, attempt),
                        None => err.is_retryable(),
                    };

                    if !retryable {
                        let mut stats = self.stats.lock();
                        stats.total_calls += 1;
                        stats.final_failures += 1;
                        return Err(err);
                    }

                    if attempt >= self.config.max_retries {
                        let mut stats = self.stats.lock();
                        stats.total_calls += 1;
                        stats.final_failures += 1;
                        return Err(SyncError::RetriesExhausted {
                            context: context.to_string(),
                            attempts: attempt + 1,
                            source: Box::new(err),
                        });
                    }

                    if let Some(observer) = hooks.on_retry {
                        observer(&err, attempt);
                    }

                    let delay = self.config.delay_for_attempt(attempt);
                    tracing::debug!(
                        context,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
