//! Dialogue payloads for blocking "ask and wait" interactions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Button set shown by a message box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBoxButtons {
    /// A single OK button.
    Ok,
    /// OK and Cancel.
    OkCancel,
    /// Yes and No.
    YesNo,
    /// Yes, No and Cancel.
    YesNoCancel,
}

impl MessageBoxButtons {
    /// Returns `true` if `result` is one of the buttons this set offers.
    #[must_use]
    pub fn offers(self, result: MessageBoxResult) -> bool {
        match self {
            Self::Ok => matches!(result, MessageBoxResult::Ok),
            Self::OkCancel => matches!(result, MessageBoxResult::Ok | MessageBoxResult::Cancel),
            Self::YesNo => matches!(result, MessageBoxResult::Yes | MessageBoxResult::No),
            Self::YesNoCancel => matches!(
                result,
                MessageBoxResult::Yes | MessageBoxResult::No | MessageBoxResult::Cancel
            ),
        }
    }
}

/// Icon shown next to a message box text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBoxIcon {
    #[default]
    None,
    Information,
    Question,
    Warning,
    Error,
}

/// Button the user pressed in a message box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBoxResult {
    Ok,
    Cancel,
    Yes,
    No,
}

/// A file type filter entry for open/save dialogues, e.g. `("AASX package", "*.aasx")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    /// Human readable description.
    pub description: String,
    /// Glob pattern.
    pub pattern: String,
}

impl FileFilter {
    /// Creates a filter entry.
    pub fn new(description: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self { description: description.into(), pattern: pattern.into() }
    }
}

/// What is being asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DialogueKind {
    /// A message box with a caption, text and a button set.
    MessageBox {
        caption: String,
        message: String,
        buttons: MessageBoxButtons,
        #[serde(default)]
        icon: MessageBoxIcon,
    },
    /// Choose an existing file.
    OpenFile {
        title: String,
        #[serde(default)]
        filters: Vec<FileFilter>,
        #[serde(default)]
        initial_directory: Option<PathBuf>,
    },
    /// Choose a file name to save to.
    SaveFile {
        title: String,
        #[serde(default)]
        filters: Vec<FileFilter>,
        #[serde(default)]
        initial_directory: Option<PathBuf>,
        #[serde(default)]
        proposed_file_name: Option<String>,
    },
    /// Free text prompt.
    TextInput {
        caption: String,
        prompt: String,
        #[serde(default)]
        default_text: String,
    },
    /// A read-only log view the user acknowledges.
    LogView { caption: String, lines: Vec<String> },
    /// Pick one entry from a list.
    SelectFromList { caption: String, items: Vec<String> },
}

/// The answer supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum DialogueResult {
    /// Nothing was asked, or the dialogue carries no answer.
    None,
    /// A message box button.
    Button(MessageBoxResult),
    /// A chosen file.
    FilePath(PathBuf),
    /// Entered text.
    Text(String),
    /// Index into a list or menu.
    Selected(usize),
    /// The user dismissed the dialogue.
    Cancelled,
}

impl DialogueResult {
    /// Returns `true` if the user dismissed the dialogue.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Button(MessageBoxResult::Cancel))
    }
}

/// A dialogue plus the slot the client's answer is written into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueData {
    /// What is being asked.
    pub kind: DialogueKind,
    /// Filled in once the client answered.
    #[serde(default)]
    pub result: Option<DialogueResult>,
}

impl DialogueData {
    /// Wraps a dialogue kind with an empty result.
    #[must_use]
    pub fn new(kind: DialogueKind) -> Self {
        Self { kind, result: None }
    }

    /// A message box.
    pub fn message_box(
        caption: impl Into<String>,
        message: impl Into<String>,
        buttons: MessageBoxButtons,
    ) -> Self {
        Self::new(DialogueKind::MessageBox {
            caption: caption.into(),
            message: message.into(),
            buttons,
            icon: MessageBoxIcon::None,
        })
    }

    /// A free text prompt.
    pub fn text_input(
        caption: impl Into<String>,
        prompt: impl Into<String>,
        default_text: impl Into<String>,
    ) -> Self {
        Self::new(DialogueKind::TextInput {
            caption: caption.into(),
            prompt: prompt.into(),
            default_text: default_text.into(),
        })
    }

    /// An open-file dialogue.
    pub fn open_file(title: impl Into<String>, filters: Vec<FileFilter>) -> Self {
        Self::new(DialogueKind::OpenFile {
            title: title.into(),
            filters,
            initial_directory: None,
        })
    }

    /// A save-file dialogue.
    pub fn save_file(
        title: impl Into<String>,
        filters: Vec<FileFilter>,
        proposed_file_name: Option<String>,
    ) -> Self {
        Self::new(DialogueKind::SaveFile {
            title: title.into(),
            filters,
            initial_directory: None,
            proposed_file_name,
        })
    }

    /// Sets the icon if this is a message box; other kinds are returned unchanged.
    #[must_use]
    pub fn with_icon(mut self, new_icon: MessageBoxIcon) -> Self {
        if let DialogueKind::MessageBox { icon, .. } = &mut self.kind {
            *icon = new_icon;
        }
        self
    }

    /// Short name of the dialogue kind, for logs.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            DialogueKind::MessageBox { .. } => "message_box",
            DialogueKind::OpenFile { .. } => "open_file",
            DialogueKind::SaveFile { .. } => "save_file",
            DialogueKind::TextInput { .. } => "text_input",
            DialogueKind::LogView { .. } => "log_view",
            DialogueKind::SelectFromList { .. } => "select_from_list",
        }
    }
}
