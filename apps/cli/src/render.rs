//! Render trigger used by the simulation: logs instead of drawing.

use broker_abstraction::{FollowUpAction, RenderTrigger, SessionId};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Counts re-render requests and runs deferred follow-ups on the runtime.
#[derive(Debug)]
pub struct LoggingRenderTrigger {
    renders: AtomicU64,
    follow_ups: AtomicU64,
    runtime: Handle,
}

impl LoggingRenderTrigger {
    /// Creates a trigger bound to the current Tokio runtime.
    pub fn for_current_runtime() -> Self {
        Self { renders: AtomicU64::new(0), follow_ups: AtomicU64::new(0), runtime: Handle::current() }
    }

    pub fn renders(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    pub fn follow_ups(&self) -> u64 {
        self.follow_ups.load(Ordering::Relaxed)
    }
}

impl RenderTrigger for LoggingRenderTrigger {
    fn notify_session_changed(&self, session: &SessionId) {
        self.renders.fetch_add(1, Ordering::Relaxed);
        debug!(session = %session, "Render requested");
    }

    fn schedule(&self, session: &SessionId, follow_up: FollowUpAction) {
        self.follow_ups.fetch_add(1, Ordering::Relaxed);
        match follow_up {
            FollowUpAction::Deferred(task) => {
                debug!(session = %session, "Running deferred follow-up");
                self.runtime.spawn(task.into_future());
            }
            other => info!(session = %session, follow_up = ?other, "Follow-up requested"),
        }
    }
}
