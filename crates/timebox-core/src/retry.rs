//! Bounded retry with exponential backoff.
//!
//! One policy object is injected per collaborator call site (load, autosave,
//! finish). Every attempt carries its own timeout, and a timeout feeds the
//! same backoff as an explicit failure.

use std::future::Future;
use std::time::Duration;

use crate::error::ServiceError;

/// Retry schedule for a collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Deadline for each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Backoff before attempt number `attempt` (1-based). The first attempt
    /// has no delay; each later one doubles, capped at `max_backoff`.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `operation` only labels log lines.
    pub async fn run<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.run_while(operation, || true, call).await
    }

    /// Like [`run`](Self::run), but asks `should_continue` after each backoff
    /// and before every retry. Once it answers `false` no further attempt is
    /// made and the last failure is returned.
    pub async fn run_while<T, P, F, Fut>(
        &self,
        operation: &str,
        mut should_continue: P,
        mut call: F,
    ) -> Result<T, ServiceError>
    where
        P: FnMut() -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut hint: Option<Duration> = None;
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = hint.take().unwrap_or_else(|| self.backoff_before(attempt));
                tokio::time::sleep(delay.min(self.max_backoff)).await;
                if !should_continue() {
                    tracing::debug!("{operation} not retried: superseded");
                    break;
                }
            }

            let outcome = match tokio::time::timeout(self.attempt_timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ServiceError::Timeout(
                    self.attempt_timeout.as_millis() as u64,
                )),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_permanent() => {
                    tracing::debug!("{operation} failed permanently: {e}");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("{operation} attempt {attempt}/{attempts} failed: {e}");
                    hint = e.retry_after_ms().map(Duration::from_millis);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ServiceError::Network("no attempts made".into())))
    }
}
