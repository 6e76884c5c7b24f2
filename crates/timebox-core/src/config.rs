//! Engine configuration.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Tunables for an [`AttemptSession`](crate::session::AttemptSession).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fetching the assessment definition.
    pub load_retry: RetryPolicy,
    /// Each autosave request.
    pub autosave_retry: RetryPolicy,
    /// The finish call.
    pub finish_retry: RetryPolicy,
    /// Edits to the same question within this window collapse into one request.
    pub autosave_window: Duration,
    /// How often the countdown publishes the remaining time.
    pub tick_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            load_retry: RetryPolicy::default(),
            autosave_retry: RetryPolicy::default(),
            finish_retry: RetryPolicy {
                max_attempts: 4,
                ..RetryPolicy::default()
            },
            autosave_window: Duration::from_millis(300),
            tick_interval: Duration::from_secs(1),
        }
    }
}
