//! Modal state of a session.

use serde::{Deserialize, Serialize};

/// Where a session is in its current modal interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModalState {
    /// Nothing pending. Initial and terminal state.
    #[default]
    Idle,
    /// A dialogue or background action is pending and visible to the client.
    Open,
    /// The client answered; the answer has not been consumed yet.
    Done,
}

impl ModalState {
    /// Checks if the session can move to `to`.
    ///
    /// The only legal edges are `Idle -> Open -> Done -> Idle`. In particular
    /// `Open -> Open` is illegal: modals do not nest.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Open) | (Self::Open, Self::Done) | (Self::Done, Self::Idle)
        )
    }

    /// Returns `true` while an interaction occupies the session.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        // The cycle
        assert!(ModalState::Idle.can_transition_to(ModalState::Open));
        assert!(ModalState::Open.can_transition_to(ModalState::Done));
        assert!(ModalState::Done.can_transition_to(ModalState::Idle));

        // No nesting, no skipping, no going back
        assert!(!ModalState::Open.can_transition_to(ModalState::Open));
        assert!(!ModalState::Idle.can_transition_to(ModalState::Done));
        assert!(!ModalState::Open.can_transition_to(ModalState::Idle));
        assert!(!ModalState::Done.can_transition_to(ModalState::Open));
        assert!(!ModalState::Idle.can_transition_to(ModalState::Idle));
    }

    #[test]
    fn test_is_active() {
        assert!(!ModalState::Idle.is_active());
        assert!(ModalState::Open.is_active());
        assert!(ModalState::Done.is_active());
        assert_eq!(ModalState::default(), ModalState::Idle);
    }
}
