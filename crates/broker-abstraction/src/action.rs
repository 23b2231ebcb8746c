//! Fire-and-forget interactions whose answer is consumed by the dispatch loop.

use crate::{CallbackError, FollowUpAction};
use std::fmt;
use std::sync::Arc;

/// What an application callback hands back: an optional follow-up for the host.
pub type CallbackOutcome = Result<Option<FollowUpAction>, CallbackError>;

/// Invoked with the index of the chosen menu item.
pub type MenuCallback = Arc<dyn Fn(usize) -> CallbackOutcome + Send + Sync>;

/// Invoked with the new value of an edited element.
pub type ValueChangedCallback = Arc<dyn Fn(&str) -> CallbackOutcome + Send + Sync>;

/// A context menu offered to the client.
#[derive(Clone)]
pub struct ContextMenu {
    /// Item labels, in display order.
    pub items: Vec<String>,
    on_select: MenuCallback,
}

impl ContextMenu {
    /// Creates a menu whose `on_select` runs with the chosen item index.
    pub fn new<I, S, F>(items: I, on_select: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(usize) -> CallbackOutcome + Send + Sync + 'static,
    {
        Self { items: items.into_iter().map(Into::into).collect(), on_select: Arc::new(on_select) }
    }

    /// Runs the selection callback.
    pub fn select(&self, index: usize) -> CallbackOutcome {
        (self.on_select)(index)
    }

    /// Label of the item at `index`.
    #[must_use]
    pub fn item(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }
}

impl fmt::Debug for ContextMenu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextMenu").field("items", &self.items).finish_non_exhaustive()
    }
}

/// A UI element whose value can be edited in place.
#[derive(Clone)]
pub struct ValueEditTarget {
    /// Host-defined element id.
    pub element_id: String,
    on_value_changed: ValueChangedCallback,
}

impl ValueEditTarget {
    /// Creates a target whose callback receives each submitted value.
    pub fn new<F>(element_id: impl Into<String>, on_value_changed: F) -> Self
    where
        F: Fn(&str) -> CallbackOutcome + Send + Sync + 'static,
    {
        Self { element_id: element_id.into(), on_value_changed: Arc::new(on_value_changed) }
    }

    /// Runs the value-changed callback.
    pub fn apply(&self, value: &str) -> CallbackOutcome {
        (self.on_value_changed)(value)
    }
}

impl fmt::Debug for ValueEditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueEditTarget")
            .field("element_id", &self.element_id)
            .finish_non_exhaustive()
    }
}

/// A context menu together with the client's choice, once made.
#[derive(Debug, Clone)]
pub struct ContextMenuChoice {
    pub menu: ContextMenu,
    /// `None` until answered, and after answering if the menu was dismissed.
    pub chosen: Option<usize>,
}

/// An edited element and the value the client submitted.
#[derive(Debug, Clone)]
pub struct ValueEdit {
    pub target: ValueEditTarget,
    pub new_value: String,
}

/// A pending fire-and-forget interaction. Absence is modelled as `Option::None`.
#[derive(Debug, Clone)]
pub enum BackgroundAction {
    ContextMenuChoice(ContextMenuChoice),
    ValueEdit(ValueEdit),
}

impl BackgroundAction {
    /// The payload-free tag of this action.
    #[must_use]
    pub fn kind(&self) -> BackgroundKind {
        match self {
            Self::ContextMenuChoice(_) => BackgroundKind::ContextMenuChoice,
            Self::ValueEdit(_) => BackgroundKind::ValueEdit,
        }
    }
}

/// Tag of a [`BackgroundAction`], cheap to copy into logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundKind {
    ContextMenuChoice,
    ValueEdit,
}
