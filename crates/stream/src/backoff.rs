//! Exponential backoff timing for reconnection attempts.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Delay before retry attempt `attempt` (1-based):
/// `min(base * 2^(attempt-1), max)`.
pub fn retry_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(31);
    base.saturating_mul(factor).min(max)
}

/// One scheduled retry callback. Dropping or cancelling the timer
/// aborts it; the manager replaces its timer on every schedule, so at
/// most one is ever outstanding.
pub struct RetryTimer {
    handle: JoinHandle<()>,
}

impl RetryTimer {
    /// Schedule `on_fire` to run after `delay`. The callback runs on
    /// the runtime, not on the caller's stack.
    pub fn schedule<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });
        Self { handle }
    }

    /// Idempotent; safe to call after the timer has already fired.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
