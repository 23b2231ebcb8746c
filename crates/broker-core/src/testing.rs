//! Test doubles for hosts and for this crate's own tests.

use broker_abstraction::{FollowUpAction, RenderTrigger, SessionId};
use std::sync::{Mutex, PoisonError};

/// A render trigger that records every call instead of rendering.
#[derive(Debug, Default)]
pub struct RecordingRenderTrigger {
    notifications: Mutex<Vec<SessionId>>,
    scheduled: Mutex<Vec<(SessionId, FollowUpAction)>>,
}

impl RecordingRenderTrigger {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of re-render requests received for `session`.
    pub fn notification_count(&self, session: &str) -> usize {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|id| id.as_str() == session)
            .count()
    }

    /// Total number of re-render requests.
    pub fn total_notifications(&self) -> usize {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of follow-ups handed over so far.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drains the recorded follow-ups.
    pub fn take_scheduled(&self) -> Vec<(SessionId, FollowUpAction)> {
        std::mem::take(&mut *self.scheduled.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl RenderTrigger for RecordingRenderTrigger {
    fn notify_session_changed(&self, session: &SessionId) {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner).push(session.clone());
    }

    fn schedule(&self, session: &SessionId, follow_up: FollowUpAction) {
        self.scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session.clone(), follow_up));
    }
}
