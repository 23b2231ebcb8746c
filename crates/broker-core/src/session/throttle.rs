//! Minimum quiet period between closing one modal and opening the next.
//!
//! The browser's close transition can race with an immediately following
//! open, so sequential dialogues on one session are spaced out.

use crate::clock::Clock;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Enforces the quiet interval for one session.
#[derive(Clone)]
pub struct ThrottleGuard {
    quiet_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ThrottleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleGuard")
            .field("quiet_interval", &self.quiet_interval)
            .finish_non_exhaustive()
    }
}

impl ThrottleGuard {
    /// Creates a guard with the given quiet interval.
    pub fn new(quiet_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { quiet_interval, clock }
    }

    /// The configured quiet interval.
    #[must_use]
    pub fn quiet_interval(&self) -> Duration {
        self.quiet_interval
    }

    /// Current instant according to the guard's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// How much longer a new modal has to wait, given the last close time.
    #[must_use]
    pub fn remaining(&self, last_close: Option<Instant>) -> Duration {
        last_close.map_or(Duration::ZERO, |closed_at| {
            let elapsed = self.clock.now().saturating_duration_since(closed_at);
            self.quiet_interval.saturating_sub(elapsed)
        })
    }

    /// Sleeps the calling thread until the quiet interval has passed.
    ///
    /// Returns how long it slept.
    pub fn wait_blocking(&self, last_close: Option<Instant>) -> Duration {
        let remaining = self.remaining(last_close);
        if !remaining.is_zero() {
            debug!(remaining_ms = remaining.as_millis(), "Waiting for modal quiet period");
            self.clock.sleep_blocking(remaining);
        }
        remaining
    }

    /// Cooperative equivalent of [`Self::wait_blocking`].
    pub async fn wait(&self, last_close: Option<Instant>) -> Duration {
        let remaining = self.remaining(last_close);
        if !remaining.is_zero() {
            debug!(remaining_ms = remaining.as_millis(), "Waiting for modal quiet period");
            self.clock.sleep(remaining).await;
        }
        remaining
    }
}
