//! Interactive payloads: actions, shortcuts, views and options requests.

use serde::Deserialize;
use serde_json::Value;

use super::{IdRef, flexible_bool};

// ============================================================================
// Actions
// ============================================================================

/// The structural shape of an action payload, taken from its `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Block Kit interactive elements.
    BlockActions,
    /// Legacy message attachments with buttons or menus.
    InteractiveMessage,
    /// Legacy dialog submissions.
    DialogSubmission,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockActions => "block_actions",
            Self::InteractiveMessage => "interactive_message",
            Self::DialogSubmission => "dialog_submission",
        }
    }
}

/// One element of the `actions` array.
///
/// Block actions carry `action_id` and `block_id`; legacy interactive
/// messages only carry `name`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionItem {
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub block_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub action_type: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub selected_option: Option<Value>,
}

/// An interactive action payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionPayload {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub actions: Vec<ActionItem>,
    /// Set for legacy interactive messages and dialogs.
    #[serde(default)]
    pub callback_id: Option<String>,
    #[serde(default)]
    pub user: Option<IdRef>,
    #[serde(default)]
    pub team: Option<IdRef>,
    #[serde(default)]
    pub enterprise: Option<IdRef>,
    #[serde(default)]
    pub channel: Option<IdRef>,
    /// Set when the action happened inside a modal or home tab.
    #[serde(default)]
    pub view: Option<ViewState>,
    #[serde(default)]
    pub message: Option<Value>,
    /// Dialog field values.
    #[serde(default)]
    pub submission: Option<Value>,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_enterprise_install: bool,
    #[serde(skip)]
    pub raw: Value,
}

impl ActionPayload {
    /// Returns the first action, which is the one that triggered the payload.
    pub fn action(&self) -> Option<&ActionItem> {
        self.actions.first()
    }
}

// ============================================================================
// Shortcuts
// ============================================================================

/// The kind of shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ShortcutKind {
    /// A global shortcut (`type: shortcut`).
    #[serde(rename = "shortcut")]
    Global,
    /// A message shortcut (`type: message_action`).
    #[serde(rename = "message_action")]
    Message,
}

impl ShortcutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "shortcut",
            Self::Message => "message_action",
        }
    }
}

/// A global or message shortcut payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ShortcutPayload {
    #[serde(rename = "type")]
    pub kind: ShortcutKind,
    pub callback_id: String,
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default)]
    pub user: Option<IdRef>,
    #[serde(default)]
    pub team: Option<IdRef>,
    #[serde(default)]
    pub enterprise: Option<IdRef>,
    /// Only present on message shortcuts.
    #[serde(default)]
    pub channel: Option<IdRef>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_enterprise_install: bool,
    #[serde(skip)]
    pub raw: Value,
}

// ============================================================================
// Views
// ============================================================================

/// Whether a view was submitted or dismissed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    #[default]
    ViewSubmission,
    ViewClosed,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewSubmission => "view_submission",
            Self::ViewClosed => "view_closed",
        }
    }
}

/// The view object embedded in view and action payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub callback_id: String,
    #[serde(default, rename = "type")]
    pub view_type: Option<String>,
    #[serde(default)]
    pub private_metadata: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    /// Input values keyed by block id and action id.
    #[serde(default)]
    pub state: Option<Value>,
}

/// A response URL generated for a view submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseUrl {
    #[serde(default)]
    pub block_id: Option<String>,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub response_url: String,
}

/// A view submission or closure.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewPayload {
    #[serde(rename = "type")]
    pub kind: ViewKind,
    pub view: ViewState,
    #[serde(default)]
    pub user: Option<IdRef>,
    #[serde(default)]
    pub team: Option<IdRef>,
    #[serde(default)]
    pub enterprise: Option<IdRef>,
    #[serde(default)]
    pub response_urls: Vec<ResponseUrl>,
    #[serde(default)]
    pub trigger_id: Option<String>,
    /// Set on `view_closed` when the whole view stack was cleared.
    #[serde(default)]
    pub is_cleared: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_enterprise_install: bool,
    #[serde(skip)]
    pub raw: Value,
}

// ============================================================================
// Options
// ============================================================================

/// The source of an options request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionsKind {
    BlockSuggestion,
    DialogSuggestion,
    InteractiveMessage,
}

impl OptionsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockSuggestion => "block_suggestion",
            Self::DialogSuggestion => "dialog_suggestion",
            Self::InteractiveMessage => "interactive_message",
        }
    }
}

/// A request for the options of an external select menu.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionsRequest {
    #[serde(rename = "type")]
    pub kind: OptionsKind,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub block_id: Option<String>,
    #[serde(default)]
    pub callback_id: Option<String>,
    /// Legacy menus identify themselves by `name`.
    #[serde(default)]
    pub name: Option<String>,
    /// What the user has typed so far.
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub user: Option<IdRef>,
    #[serde(default)]
    pub team: Option<IdRef>,
    #[serde(default)]
    pub enterprise: Option<IdRef>,
    #[serde(default)]
    pub channel: Option<IdRef>,
    #[serde(default)]
    pub view: Option<ViewState>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_enterprise_install: bool,
    #[serde(skip)]
    pub raw: Value,
}
