//! Countdown timer.
//!
//! Remaining time is always derived from a fixed deadline
//! (`started_at + duration - now`), never from a decremented counter, so a
//! stalled event loop or a suspended process cannot make the countdown drift.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::SharedClock;

/// A wall-clock-anchored countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    started_at: Instant,
    duration: Duration,
}

impl Countdown {
    pub fn new(started_at: Instant, duration: Duration) -> Self {
        Self {
            started_at,
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn deadline(&self) -> Instant {
        self.started_at + self.duration
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline().saturating_duration_since(now)
    }

    /// Remaining whole seconds, rounded up so the display only reads zero
    /// once the deadline has actually passed.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now);
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Whole seconds elapsed, capped at the duration.
    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started_at)
            .min(self.duration)
            .as_secs()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline()
    }
}

/// Handle to a running countdown task.
///
/// Dropping the handle or calling [`cancel`](Self::cancel) tears the task
/// down; the expiry callback cannot run afterwards.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
    remaining: watch::Receiver<u64>,
}

impl TimerHandle {
    /// Receiver updated with the remaining seconds on every tick.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.remaining.clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start ticking `countdown`.
///
/// Each tick publishes `countdown.remaining_secs(clock.now())`. Independently
/// of ticks, the task sleeps until the deadline itself, so expiry fires on
/// time even if ticks were skipped. `on_expire` runs at most once.
pub fn spawn_countdown<F>(
    countdown: Countdown,
    clock: SharedClock,
    tick_interval: Duration,
    on_expire: F,
) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = watch::channel(countdown.remaining_secs(clock.now()));
    let tick_interval = tick_interval.max(Duration::from_millis(10));

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let expiry = tokio::time::sleep_until(countdown.deadline());
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                _ = &mut expiry => break,
                _ = ticker.tick() => {
                    let now = clock.now();
                    let _ = tx.send(countdown.remaining_secs(now));
                    if countdown.is_expired(now) {
                        break;
                    }
                }
            }
        }

        let _ = tx.send(0);
        tracing::debug!("countdown reached zero");
        on_expire();
    });

    TimerHandle { task, remaining: rx }
}
