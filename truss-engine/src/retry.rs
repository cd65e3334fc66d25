//! ABOUTME: Retry policy for durable activities: exponential backoff gated
//! ABOUTME: on TrussError::is_retryable, mirroring each activity's timeout

use std::future::Future;
use std::time::Duration;
use truss_core::{Result, TrussError};

/// Per-activity retry policy. Mirrors the Temporal retry policies the
/// original workflow attached to each activity (distinct timeouts and
/// attempt counts per activity kind), realised here as plain parameters
/// rather than a server-side construct.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub max_interval: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, initial_interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_interval,
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(60),
        }
    }

    /// `CreateRun`/`CreateRunStep`: 10s timeout, 3 attempts in the original.
    #[must_use]
    pub fn storage_write() -> Self {
        Self::new(3, Duration::from_millis(200))
    }

    /// `GetRunMemory`: 15s timeout, default Temporal retry (we use the same
    /// cadence as other storage reads).
    #[must_use]
    pub fn storage_read() -> Self {
        Self::new(3, Duration::from_millis(200))
    }

    /// `LLMStreamPublish`: 3 minute timeout, 5 attempts in the original.
    #[must_use]
    pub fn llm_stream() -> Self {
        Self::new(5, Duration::from_secs(1))
    }

    /// `ExecuteTool`: 1 minute timeout, default retry (3 attempts).
    #[must_use]
    pub fn tool_execution() -> Self {
        Self::new(3, Duration::from_millis(500))
    }

    /// `FinalizeRun`: 30s timeout, 10 attempts in the original — finalising
    /// the run's terminal status must not be lost.
    #[must_use]
    pub fn finalize_run() -> Self {
        Self::new(10, Duration::from_millis(200))
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_interval)
    }

    /// Runs `activity` up to `max_attempts` times, retrying only while the
    /// returned error is retryable. Logs each retry at `tracing::warn!`
    /// with the activity name for observability.
    pub async fn run<T, F, Fut>(&self, activity_name: &str, mut activity: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match activity().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        activity = activity_name,
                        attempt,
                        ?delay,
                        error = %err,
                        "activity failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if !err.is_retryable() {
                        tracing::debug!(activity = activity_name, error = %err, "non-retryable activity error");
                    } else {
                        tracing::error!(activity = activity_name, attempts = attempt + 1, error = %err, "activity exhausted retries");
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Sentinel error used by tests to exercise the non-retryable path without
/// depending on a specific `TrussError` variant's semantics.
#[must_use]
pub fn non_retryable(message: &str) -> TrussError {
    TrussError::invalid_input(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let attempts = AtomicU32::new(0);
        let result = policy
            .run("test-activity", || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TrussError::storage("transient"))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let attempts = AtomicU32::new(0);
        let result: Result<()> = policy
            .run("test-activity", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(non_retryable("bad input"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let attempts = AtomicU32::new(0);
        let result: Result<()> = policy
            .run("test-activity", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TrussError::storage("still down"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
