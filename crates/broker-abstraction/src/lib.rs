//! Interface layer for the modal interaction broker.
//!
//! This crate defines the values that flow *through* the broker (dialogue
//! payloads, background actions, follow-up work) and the trait the hosting
//! rendering layer implements so the broker can ask for a re-render.

pub mod action;
pub mod dialogue;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

pub use action::{
    BackgroundAction, BackgroundKind, CallbackOutcome, ContextMenu, ContextMenuChoice,
    MenuCallback, ValueChangedCallback, ValueEdit, ValueEditTarget,
};
pub use dialogue::{
    DialogueData, DialogueKind, DialogueResult, FileFilter, MessageBoxButtons, MessageBoxIcon,
    MessageBoxResult,
};

/// Identifier of one live client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a fresh, random session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Error raised by an application callback run on behalf of a background action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The callback rejected the value it was given.
    #[error("Invalid value '{value}': {reason}")]
    InvalidValue {
        /// The value the client submitted.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The callback ran but failed.
    #[error("Callback failed: {0}")]
    Failed(String),

    /// The callback panicked; the panic message is preserved when it was a string.
    #[error("Callback panicked: {0}")]
    Panicked(String),
}

impl CallbackError {
    /// Creates a `Failed` error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Work to be executed later on the host's own scheduler.
pub struct DeferredTask(BoxFuture<'static, ()>);

impl DeferredTask {
    /// Wraps a future so it can be handed to the render trigger's scheduler.
    pub fn new<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self(Box::pin(future))
    }

    /// Unwraps the boxed future.
    #[must_use]
    pub fn into_future(self) -> BoxFuture<'static, ()> {
        self.0
    }
}

impl fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeferredTask").finish_non_exhaustive()
    }
}

/// What the host should do after a background action's callback ran.
#[derive(Debug)]
pub enum FollowUpAction {
    /// Re-render the current view.
    Redraw,
    /// Rebuild the whole view, optionally focusing an element afterwards.
    RedrawAll {
        /// Element to focus once rebuilt.
        focus: Option<String>,
    },
    /// Navigate to another element of the displayed tree.
    NavigateTo {
        /// Host-defined reference of the target.
        target: String,
    },
    /// Further asynchronous work the callback could not finish inline.
    Deferred(DeferredTask),
}

/// The hosting rendering layer, as seen by the broker.
///
/// Both methods are fire-and-forget: implementations must return promptly and
/// decide on their own when and how to actually redraw or run the work.
pub trait RenderTrigger: Send + Sync {
    /// Signals that `session` has new state and should be re-rendered.
    fn notify_session_changed(&self, session: &SessionId);

    /// Hands follow-up work produced by a dispatched callback to the host.
    fn schedule(&self, session: &SessionId, follow_up: FollowUpAction);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display_and_conversions() {
        let id = SessionId::from("A");
        assert_eq!(id.to_string(), "A");
        assert_eq!(id.as_str(), "A");
        assert_eq!(SessionId::new(String::from("A")), id);
    }

    #[test]
    fn test_generated_session_ids_differ() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_callback_error_display() {
        let err = CallbackError::InvalidValue {
            value: "abc".to_string(),
            reason: "not a number".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value 'abc': not a number");
        assert_eq!(CallbackError::failed("boom").to_string(), "Callback failed: boom");
    }

    #[test]
    fn test_deferred_task_debug() {
        let task = DeferredTask::new(async {});
        assert!(format!("{:?}", task).starts_with("DeferredTask"));
    }
}
