//! Monotonic time source for the countdown.
//!
//! Backed by `tokio::time::Instant`, so it keeps counting while the process
//! is starved of ticks and honours `tokio::time::pause` in tests.

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;

/// Supplies monotonic "now" readings.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The runtime's monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared handle to a clock.
#[derive(Clone)]
pub struct SharedClock(Arc<dyn Clock>);

impl SharedClock {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self(Arc::new(clock))
    }

    pub fn now(&self) -> Instant {
        self.0.now()
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new(MonotonicClock)
    }
}

impl fmt::Debug for SharedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedClock")
    }
}
