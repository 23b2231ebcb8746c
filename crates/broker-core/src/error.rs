//! Error types for the modal interaction broker.

use crate::session::ModalState;
use broker_abstraction::SessionId;
use thiserror::Error;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Broker errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A dialogue or action is already in flight for the session.
    #[error("Some modal dialogue is still active for session {session} (state: {state:?})")]
    ModalAlreadyActive {
        /// Session the new interaction was refused on.
        session: SessionId,
        /// State the session was in.
        state: ModalState,
    },

    /// An answer or wait arrived while nothing matching was pending.
    #[error("No modal interaction is pending for session {0}")]
    NothingPending(SessionId),

    /// A state change outside `Idle -> Open -> Done -> Idle` was attempted.
    #[error("Invalid modal transition for session {session}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Session the transition was attempted on.
        session: SessionId,
        /// Current state.
        from: ModalState,
        /// Requested state.
        to: ModalState,
    },

    /// The client chose a menu index that does not exist.
    #[error("Menu choice {index} is out of range for session {session} ({len} items)")]
    InvalidMenuChoice {
        /// Session the menu belongs to.
        session: SessionId,
        /// Index the client sent.
        index: usize,
        /// Number of menu items.
        len: usize,
    },

    /// The answer does not fit the pending interaction.
    #[error("Answer does not match the pending {pending} for session {session}: {reason}")]
    AnswerMismatch {
        /// Session the answer was sent to.
        session: SessionId,
        /// Kind of the pending interaction.
        pending: &'static str,
        /// What was wrong with the answer.
        reason: String,
    },

    /// The session was removed from the registry.
    #[error("Session {0} was closed")]
    SessionClosed(SessionId),

    /// A bounded wait ran out before the client answered.
    #[error("Modal wait abandoned for session {session} after {waited_ms}ms")]
    WaitAbandoned {
        /// Session whose dialogue was abandoned.
        session: SessionId,
        /// How long the caller waited.
        waited_ms: u128,
    },

    /// The dispatch loop was started twice.
    #[error("Dispatch loop is already running")]
    DispatcherAlreadyRunning,

    /// The dispatch loop was stopped while not running.
    #[error("Dispatch loop is not running")]
    DispatcherNotRunning,

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for BrokerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::de::Error> for BrokerError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BrokerError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl BrokerError {
    /// Session the error refers to, if any.
    #[must_use]
    pub fn session(&self) -> Option<&SessionId> {
        match self {
            Self::ModalAlreadyActive { session, .. }
            | Self::InvalidTransition { session, .. }
            | Self::InvalidMenuChoice { session, .. }
            | Self::AnswerMismatch { session, .. }
            | Self::WaitAbandoned { session, .. }
            | Self::NothingPending(session)
            | Self::SessionClosed(session) => Some(session),
            Self::DispatcherAlreadyRunning | Self::DispatcherNotRunning | Self::Config(_) => None,
        }
    }
}
