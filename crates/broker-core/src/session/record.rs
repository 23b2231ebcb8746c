//! The session record and its modal protocol.
//!
//! Every field of a session lives behind one mutex. Blocking waiters sleep on a
//! condition variable and async waiters on a `watch` channel; both are
//! signalled whenever the slot changes, so an answer wakes the waiter directly.

use super::state::ModalState;
use super::throttle::ThrottleGuard;
use crate::clock::{Clock, SystemClock};
use crate::config::ModalConfig;
use crate::error::{BrokerError, Result};
use broker_abstraction::{
    BackgroundAction, ContextMenu, ContextMenuChoice, DialogueData, DialogueKind, DialogueResult,
    RenderTrigger, SessionId, ValueEdit, ValueEditTarget,
};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Per-session protocol settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Minimum time between closing one modal and opening the next.
    pub quiet_interval: Duration,
    /// Deadline used by `ask_modal`/`ask_modal_async`. `None` waits forever.
    pub wait_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { quiet_interval: Duration::from_millis(1500), wait_timeout: None }
    }
}

impl From<&ModalConfig> for SessionSettings {
    fn from(config: &ModalConfig) -> Self {
        Self { quiet_interval: config.quiet_interval(), wait_timeout: config.wait_timeout() }
    }
}

/// What the client should currently be shown for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInteraction {
    /// A modal dialogue awaiting an answer.
    Dialogue(DialogueData),
    /// A context menu awaiting a choice.
    ContextMenu { items: Vec<String> },
    /// An in-place edit. Only visible for the instant between open and done.
    ValueEdit { element_id: String },
}

impl PendingInteraction {
    /// Short name of the interaction, for logs and render layers.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Dialogue(dialogue) => dialogue.kind_name(),
            Self::ContextMenu { .. } => "context_menu",
            Self::ValueEdit { .. } => "value_edit",
        }
    }
}

#[derive(Debug, Default)]
struct ModalSlot {
    state: ModalState,
    dialogue: Option<DialogueData>,
    action: Option<BackgroundAction>,
    last_close: Option<Instant>,
    closed: bool,
}

impl ModalSlot {
    fn transition(&mut self, session: &SessionId, to: ModalState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            error!(session = %session, from = ?self.state, to = ?to, "Invalid modal transition");
            return Err(BrokerError::InvalidTransition {
                session: session.clone(),
                from: self.state,
                to,
            });
        }
        debug!(session = %session, from = ?self.state, to = ?to, "Modal state transition");
        self.state = to;
        Ok(())
    }

    /// `Done -> Idle`, dropping the payload and stamping the close time.
    fn finish(&mut self, session: &SessionId, closed_at: Instant) -> Result<()> {
        self.transition(session, ModalState::Idle)?;
        self.dialogue = None;
        self.action = None;
        self.last_close = Some(closed_at);
        Ok(())
    }

    /// The outcome a dialogue waiter should return, or `None` to keep waiting.
    fn completion(&self, session: &SessionId) -> Option<Result<DialogueResult>> {
        if self.closed {
            return Some(Err(BrokerError::SessionClosed(session.clone())));
        }
        match (self.state, &self.dialogue) {
            (ModalState::Open, Some(_)) => None,
            (ModalState::Done, Some(dialogue)) => {
                Some(Ok(dialogue.result.clone().unwrap_or(DialogueResult::None)))
            }
            _ => Some(Err(BrokerError::NothingPending(session.clone()))),
        }
    }

    fn pending(&self) -> Option<PendingInteraction> {
        if self.state != ModalState::Open {
            return None;
        }
        if let Some(dialogue) = &self.dialogue {
            return Some(PendingInteraction::Dialogue(dialogue.clone()));
        }
        match &self.action {
            Some(BackgroundAction::ContextMenuChoice(choice)) => {
                Some(PendingInteraction::ContextMenu { items: choice.menu.items.clone() })
            }
            Some(BackgroundAction::ValueEdit(edit)) => Some(PendingInteraction::ValueEdit {
                element_id: edit.target.element_id.clone(),
            }),
            None => None,
        }
    }
}

enum QuietOpen {
    Opened,
    TooEarly(DialogueData),
}

/// Server-side state for one client connection.
pub struct Session {
    id: SessionId,
    slot: Mutex<ModalSlot>,
    signal: Condvar,
    state_tx: watch::Sender<ModalState>,
    render: Arc<dyn RenderTrigger>,
    throttle: ThrottleGuard,
    settings: SessionSettings,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.slot.try_lock().map(|slot| slot.state).ok())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session with default settings and the system clock.
    pub fn new(id: impl Into<SessionId>, render: Arc<dyn RenderTrigger>) -> Self {
        Self::with_settings(id, render, SessionSettings::default(), Arc::new(SystemClock))
    }

    /// Creates a session with explicit settings and time source.
    pub fn with_settings(
        id: impl Into<SessionId>,
        render: Arc<dyn RenderTrigger>,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ModalState::Idle);
        Self {
            id: id.into(),
            slot: Mutex::new(ModalSlot::default()),
            signal: Condvar::new(),
            state_tx,
            render,
            throttle: ThrottleGuard::new(settings.quiet_interval, clock),
            settings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ModalSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes blocking and async waiters. Call with the lock held.
    fn publish(&self, slot: &ModalSlot) {
        self.signal.notify_all();
        self.state_tx.send_replace(slot.state);
    }

    /// Asks the host to re-render. Never call with the lock held.
    fn notify_render(&self) {
        self.render.notify_session_changed(&self.id);
    }

    fn ensure_can_open(&self, slot: &ModalSlot) -> Result<()> {
        if slot.closed {
            return Err(BrokerError::SessionClosed(self.id.clone()));
        }
        if slot.state.is_active() {
            error!(session = %self.id, state = ?slot.state, "Some modal dialogue is still active");
            return Err(BrokerError::ModalAlreadyActive {
                session: self.id.clone(),
                state: slot.state,
            });
        }
        Ok(())
    }

    fn install_dialogue(&self, slot: &mut ModalSlot, mut dialogue: DialogueData) -> Result<()> {
        slot.transition(&self.id, ModalState::Open)?;
        debug!(session = %self.id, kind = dialogue.kind_name(), "Dialogue opened");
        dialogue.result = None;
        slot.dialogue = Some(dialogue);
        slot.action = None;
        self.publish(slot);
        Ok(())
    }

    fn open_dialogue(&self, dialogue: DialogueData) -> Result<()> {
        {
            let mut slot = self.lock();
            self.ensure_can_open(&slot)?;
            self.install_dialogue(&mut slot, dialogue)?;
        }
        self.notify_render();
        Ok(())
    }

    /// Opens the dialogue only if the quiet period has passed, re-checked under
    /// the lock so a close racing with the throttle wait is not missed.
    fn try_open_dialogue_quiet(&self, dialogue: DialogueData) -> Result<QuietOpen> {
        {
            let mut slot = self.lock();
            self.ensure_can_open(&slot)?;
            if !self.throttle.remaining(slot.last_close).is_zero() {
                return Ok(QuietOpen::TooEarly(dialogue));
            }
            self.install_dialogue(&mut slot, dialogue)?;
        }
        self.notify_render();
        Ok(QuietOpen::Opened)
    }

    /// Gives up on an unanswered dialogue after its deadline passed.
    fn abandon(
        &self,
        mut slot: MutexGuard<'_, ModalSlot>,
        waited: Duration,
    ) -> Result<DialogueResult> {
        if let Some(outcome) = slot.completion(&self.id) {
            return outcome;
        }
        slot.transition(&self.id, ModalState::Done)?;
        let closed_at = self.throttle.now();
        slot.finish(&self.id, closed_at)?;
        self.publish(&slot);
        drop(slot);

        warn!(session = %self.id, waited_ms = waited.as_millis(), "Modal wait abandoned");
        self.notify_render();
        Err(BrokerError::WaitAbandoned { session: self.id.clone(), waited_ms: waited.as_millis() })
    }

    async fn wait_signalled(&self) -> Result<DialogueResult> {
        let mut state_rx = self.state_tx.subscribe();
        loop {
            let outcome = self.lock().completion(&self.id);
            if let Some(outcome) = outcome {
                return outcome;
            }
            if state_rx.changed().await.is_err() {
                return Err(BrokerError::SessionClosed(self.id.clone()));
            }
        }
    }

    /// The session's id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current modal state.
    pub fn state(&self) -> ModalState {
        self.lock().state
    }

    /// Whether the session has been removed from its registry.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// When the last modal on this session closed.
    pub fn last_modal_close(&self) -> Option<Instant> {
        self.lock().last_close
    }

    /// The interaction the client should be shown right now, if any.
    pub fn pending(&self) -> Option<PendingInteraction> {
        self.lock().pending()
    }

    /// Short name of the pending interaction, if any.
    pub fn pending_kind(&self) -> Option<&'static str> {
        self.lock().pending().map(|pending| pending.kind_name())
    }

    /// Subscribes to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ModalState> {
        self.state_tx.subscribe()
    }

    /// The settings this session was created with.
    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// The host's render trigger for this session.
    #[must_use]
    pub fn render_trigger(&self) -> &Arc<dyn RenderTrigger> {
        &self.render
    }

    /// Publishes a dialogue and marks the session `Open`.
    ///
    /// An empty payload is a no-op interaction: it reports `Done` right away,
    /// leaves the session untouched and does not trigger a render.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ModalAlreadyActive`] if an interaction is already
    /// in flight. The in-flight dialogue is left as it was.
    pub fn start_modal(&self, payload: Option<DialogueData>) -> Result<ModalState> {
        let Some(dialogue) = payload else {
            debug!(session = %self.id, "Empty modal payload, nothing to ask");
            return Ok(ModalState::Done);
        };
        self.open_dialogue(dialogue)?;
        Ok(ModalState::Open)
    }

    /// Blocks the calling thread until the client answered.
    ///
    /// With a `timeout`, an unanswered dialogue is abandoned when it expires:
    /// the session moves through `Done` back to `Idle` and
    /// [`BrokerError::WaitAbandoned`] is returned.
    pub fn wait_blocking(&self, timeout: Option<Duration>) -> Result<DialogueResult> {
        let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
        let mut slot = self.lock();
        loop {
            if let Some(outcome) = slot.completion(&self.id) {
                return outcome;
            }
            slot = match deadline {
                None => self.signal.wait(slot).unwrap_or_else(PoisonError::into_inner),
                Some((deadline, limit)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return self.abandon(slot, limit);
                    }
                    self.signal
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Cooperative equivalent of [`Self::wait_blocking`].
    pub async fn wait_async(&self, timeout: Option<Duration>) -> Result<DialogueResult> {
        match timeout {
            None => self.wait_signalled().await,
            Some(limit) => match tokio::time::timeout(limit, self.wait_signalled()).await {
                Ok(outcome) => outcome,
                Err(_) => self.abandon(self.lock(), limit),
            },
        }
    }

    /// Records the client's answer to whatever is pending and marks it `Done`.
    ///
    /// A context menu accepts `Selected(index)` within range, or `Cancelled` /
    /// `None` to dismiss it.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::NothingPending`] if nothing is open
    /// - [`BrokerError::InvalidMenuChoice`] for an out-of-range menu index
    /// - [`BrokerError::AnswerMismatch`] if the answer does not fit the dialogue
    pub fn answer(&self, result: DialogueResult) -> Result<()> {
        let mut guard = self.lock();
        let slot = &mut *guard;
        if slot.closed {
            return Err(BrokerError::SessionClosed(self.id.clone()));
        }
        if slot.state != ModalState::Open {
            warn!(session = %self.id, state = ?slot.state, "Answer received with nothing pending");
            return Err(BrokerError::NothingPending(self.id.clone()));
        }

        if let Some(dialogue) = slot.dialogue.as_mut() {
            check_dialogue_answer(&dialogue.kind, &result).map_err(|reason| {
                BrokerError::AnswerMismatch {
                    session: self.id.clone(),
                    pending: dialogue.kind_name(),
                    reason,
                }
            })?;
            dialogue.result = Some(result);
        } else {
            match slot.action.as_mut() {
                Some(BackgroundAction::ContextMenuChoice(choice)) => {
                    choice.chosen = self.menu_choice(&choice.menu, result)?;
                }
                Some(BackgroundAction::ValueEdit(_)) => {
                    return Err(BrokerError::AnswerMismatch {
                        session: self.id.clone(),
                        pending: "value_edit",
                        reason: "value edits carry their own value".to_string(),
                    });
                }
                None => return Err(BrokerError::NothingPending(self.id.clone())),
            }
        }

        slot.transition(&self.id, ModalState::Done)?;
        self.publish(slot);
        debug!(session = %self.id, "Client answer recorded");
        Ok(())
    }

    fn menu_choice(&self, menu: &ContextMenu, result: DialogueResult) -> Result<Option<usize>> {
        match result {
            DialogueResult::Selected(index) if index < menu.items.len() => Ok(Some(index)),
            DialogueResult::Selected(index) => Err(BrokerError::InvalidMenuChoice {
                session: self.id.clone(),
                index,
                len: menu.items.len(),
            }),
            DialogueResult::Cancelled | DialogueResult::None => Ok(None),
            other => Err(BrokerError::AnswerMismatch {
                session: self.id.clone(),
                pending: "context_menu",
                reason: format!("expected a menu index, got {other:?}"),
            }),
        }
    }

    /// Closes an answered dialogue: `Done -> Idle`, stamps the close time and
    /// triggers a render.
    ///
    /// Idempotent. Returns `true` only if it closed something. Calling it while
    /// the dialogue is still open is ignored.
    pub fn end_modal(&self) -> bool {
        {
            let mut slot = self.lock();
            match (slot.state, slot.dialogue.is_some()) {
                (ModalState::Done, true) => {}
                (ModalState::Open, _) => {
                    warn!(session = %self.id, "end_modal before the client answered, ignoring");
                    return false;
                }
                _ => return false,
            }
            let closed_at = self.throttle.now();
            if let Err(err) = slot.finish(&self.id, closed_at) {
                error!(session = %self.id, error = %err, "Failed to close modal");
                return false;
            }
            self.publish(&slot);
        }
        self.notify_render();
        true
    }

    /// Sleeps the calling thread until the quiet interval since the last close
    /// has passed. Returns how long it slept.
    pub fn wait_minimum_quiet_period(&self) -> Duration {
        self.throttle.wait_blocking(self.last_modal_close())
    }

    /// Cooperative equivalent of [`Self::wait_minimum_quiet_period`].
    pub async fn wait_minimum_quiet_period_async(&self) -> Duration {
        self.throttle.wait(self.last_modal_close()).await
    }

    /// Asks the client and blocks until answered: quiet period, open, wait,
    /// close.
    ///
    /// An empty payload returns [`DialogueResult::None`] without asking.
    ///
    /// # Errors
    ///
    /// Returns an error if another interaction is active, if the session is
    /// closed while waiting, or if the configured wait timeout expires.
    pub fn ask_modal(&self, payload: Option<DialogueData>) -> Result<DialogueResult> {
        let Some(mut dialogue) = payload else {
            return Ok(DialogueResult::None);
        };
        loop {
            self.wait_minimum_quiet_period();
            match self.try_open_dialogue_quiet(dialogue)? {
                QuietOpen::Opened => break,
                QuietOpen::TooEarly(returned) => dialogue = returned,
            }
        }
        let result = self.wait_blocking(self.settings.wait_timeout)?;
        self.end_modal();
        Ok(result)
    }

    /// Cooperative equivalent of [`Self::ask_modal`].
    pub async fn ask_modal_async(&self, payload: Option<DialogueData>) -> Result<DialogueResult> {
        let Some(mut dialogue) = payload else {
            return Ok(DialogueResult::None);
        };
        loop {
            self.wait_minimum_quiet_period_async().await;
            match self.try_open_dialogue_quiet(dialogue)? {
                QuietOpen::Opened => break,
                QuietOpen::TooEarly(returned) => dialogue = returned,
            }
        }
        let result = self.wait_async(self.settings.wait_timeout).await?;
        self.end_modal();
        Ok(result)
    }

    /// Shows a context menu. The choice is executed later by the dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ModalAlreadyActive`] if an interaction is in flight.
    pub fn fire_context_menu(&self, menu: ContextMenu) -> Result<()> {
        {
            let mut slot = self.lock();
            self.ensure_can_open(&slot)?;
            slot.transition(&self.id, ModalState::Open)?;
            debug!(session = %self.id, items = menu.items.len(), "Context menu opened");
            slot.dialogue = None;
            slot.action = Some(BackgroundAction::ContextMenuChoice(ContextMenuChoice {
                menu,
                chosen: None,
            }));
            self.publish(&slot);
        }
        self.notify_render();
        Ok(())
    }

    /// Records an in-place edit. It is answered immediately and applied later by
    /// the dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ModalAlreadyActive`] if an interaction is in flight.
    pub fn fire_value_edit(&self, target: ValueEditTarget, new_value: impl Into<String>) -> Result<()> {
        let mut slot = self.lock();
        self.ensure_can_open(&slot)?;
        slot.transition(&self.id, ModalState::Open)?;
        debug!(session = %self.id, element = %target.element_id, "Value edit recorded");
        slot.dialogue = None;
        slot.action = Some(BackgroundAction::ValueEdit(ValueEdit {
            target,
            new_value: new_value.into(),
        }));
        slot.transition(&self.id, ModalState::Done)?;
        self.publish(&slot);
        Ok(())
    }

    /// Takes an answered background action, returning the session to `Idle`.
    ///
    /// Leaves dialogues and unanswered actions alone.
    pub(crate) fn take_answered_action(&self) -> Option<BackgroundAction> {
        let action = {
            let mut slot = self.lock();
            if slot.closed || slot.state != ModalState::Done || slot.action.is_none() {
                return None;
            }
            let action = slot.action.take();
            let closed_at = self.throttle.now();
            if let Err(err) = slot.finish(&self.id, closed_at) {
                error!(session = %self.id, error = %err, "Failed to reset session after action");
            }
            self.publish(&slot);
            action
        };
        self.notify_render();
        action
    }

    /// Marks the session closed and wakes every waiter.
    pub(crate) fn close(&self) -> bool {
        let mut slot = self.lock();
        if slot.closed {
            return false;
        }
        slot.closed = true;
        self.publish(&slot);
        debug!(session = %self.id, state = ?slot.state, "Session closed");
        true
    }
}

/// Checks an answer against the dialogue it is meant for.
fn check_dialogue_answer(
    kind: &DialogueKind,
    result: &DialogueResult,
) -> std::result::Result<(), String> {
    match (kind, result) {
        (_, DialogueResult::Cancelled | DialogueResult::None) => Ok(()),
        (DialogueKind::MessageBox { buttons, .. }, DialogueResult::Button(button)) => {
            if buttons.offers(*button) {
                Ok(())
            } else {
                Err(format!("button {button:?} is not offered by {buttons:?}"))
            }
        }
        (DialogueKind::SelectFromList { items, .. }, DialogueResult::Selected(index)) => {
            if *index < items.len() {
                Ok(())
            } else {
                Err(format!("index {index} is out of range ({} items)", items.len()))
            }
        }
        (DialogueKind::OpenFile { .. } | DialogueKind::SaveFile { .. }, DialogueResult::FilePath(_))
        | (DialogueKind::TextInput { .. }, DialogueResult::Text(_)) => Ok(()),
        (
            DialogueKind::MessageBox { .. }
            | DialogueKind::OpenFile { .. }
            | DialogueKind::SaveFile { .. }
            | DialogueKind::TextInput { .. }
            | DialogueKind::LogView { .. }
            | DialogueKind::SelectFromList { .. },
            other,
        ) => Err(format!("unexpected answer {other:?}")),
    }
}
