//! Session records: modal state, the modal protocol and the throttle guard.

mod record;
mod state;
mod throttle;

pub use record::{PendingInteraction, Session, SessionSettings};
pub use state::ModalState;
pub use throttle::ThrottleGuard;
