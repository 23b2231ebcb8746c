//! Time source used by the throttle guard.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A source of "now" plus the two ways of waiting the broker needs.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Sleeps the calling thread.
    fn sleep_blocking(&self, duration: Duration);

    /// Sleeps cooperatively.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock time: `std::thread::sleep` and `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_blocking(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A clock that only moves when told to. Sleeping advances it instantly.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    slept: Duration,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self { base: Instant::now(), state: Mutex::new(ManualState::default()) }
    }

    /// Moves the clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.offset += duration;
    }

    /// Total time callers spent sleeping on this clock.
    pub fn slept(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).slept
    }

    fn sleep_now(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.offset += duration;
        state.slept += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.state.lock().unwrap_or_else(PoisonError::into_inner).offset
    }

    fn sleep_blocking(&self, duration: Duration) {
        self.sleep_now(duration);
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.sleep_now(duration);
        Box::pin(std::future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.sleep_blocking(Duration::from_millis(300));
        assert_eq!(clock.now() - start, Duration::from_millis(300));

        clock.advance(Duration::from_millis(200));
        assert_eq!(clock.now() - start, Duration::from_millis(500));
        assert_eq!(clock.slept(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_manual_clock_async_sleep_is_instant() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(10)).await;
        assert_eq!(clock.now() - start, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_async_sleep_follows_tokio_time() {
        let before = tokio::time::Instant::now();
        SystemClock.sleep(Duration::from_millis(1500)).await;
        assert!(tokio::time::Instant::now() - before >= Duration::from_millis(1500));
    }
}
