//! Inbound envelope model.
//!
//! An [`Envelope`] is one normalized unit of inbound work. The platform sends
//! six kinds of bodies (events, slash commands, interactive actions,
//! shortcuts, view submissions and options requests), and each one is
//! decoded into its own strongly typed payload. Matching logic switches on
//! the variant tag, never on the presence of ad-hoc fields.
//!
//! ```rust,ignore
//! use pylon_core::Envelope;
//!
//! let envelope = Envelope::from_value(serde_json::json!({
//!     "team_id": "T1",
//!     "event": { "type": "message", "text": "hello", "channel": "C1", "user": "U1" }
//! }))?;
//! assert_eq!(envelope.category(), EnvelopeCategory::Event);
//! ```

mod command;
mod event;
mod interactive;

use serde::Deserialize;
use serde_json::Value;

use crate::error::EnvelopeError;

pub use command::SlashCommand;
pub use event::{Authorization, EventBody, EventEnvelope};
pub use interactive::{
    ActionItem, ActionKind, ActionPayload, OptionsKind, OptionsRequest, ResponseUrl,
    ShortcutKind, ShortcutPayload, ViewKind, ViewPayload, ViewState,
};

// ============================================================================
// Shared Field Types
// ============================================================================

/// An `{ "id": ..., "name": ... }` reference as used by interactive payloads
/// for users, teams, channels and enterprises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdRef {
    /// The object id.
    pub id: String,
    /// The display name, when the platform includes one.
    #[serde(default)]
    pub name: Option<String>,
    /// The team the object belongs to (users only).
    #[serde(default)]
    pub team_id: Option<String>,
}

/// Accepts `true`, `"true"` and friends; the platform is not consistent about
/// how it encodes booleans in form-encoded bodies.
pub(crate) fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true") || s == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    })
}

// ============================================================================
// Envelope Category
// ============================================================================

/// The high-level category of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeCategory {
    /// Events API callbacks.
    Event,
    /// Slash command invocations.
    Command,
    /// Block actions, legacy interactive messages and dialog submissions.
    Action,
    /// Global and message shortcuts.
    Shortcut,
    /// View submissions and closures.
    View,
    /// External select / dialog options requests.
    Options,
}

impl EnvelopeCategory {
    /// Returns the category as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Command => "command",
            Self::Action => "action",
            Self::Shortcut => "shortcut",
            Self::View => "view",
            Self::Options => "options",
        }
    }
}

impl std::fmt::Display for EnvelopeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// One inbound unit of work, classified into its category.
#[derive(Debug, Clone)]
pub enum Envelope {
    Event(EventEnvelope),
    Command(SlashCommand),
    Action(ActionPayload),
    Shortcut(ShortcutPayload),
    View(ViewPayload),
    Options(OptionsRequest),
}

fn decode<T>(category: &'static str, value: &Value) -> Result<T, EnvelopeError>
where
    T: for<'de> Deserialize<'de>,
{
    T::deserialize(value).map_err(|source| EnvelopeError::Malformed { category, source })
}

impl Envelope {
    /// Classifies and decodes a raw JSON body.
    ///
    /// The checks run in a fixed order: an `event` key wins over everything,
    /// then `command`, then options requests, actions, shortcuts and views.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let body_type = value.get("type").and_then(Value::as_str).unwrap_or("");

        if value.get("event").is_some() {
            let mut envelope: EventEnvelope = decode("event", &value)?;
            envelope.event.raw = value["event"].clone();
            envelope.raw = value;
            return Ok(Self::Event(envelope));
        }

        if value.get("command").is_some() {
            let mut command: SlashCommand = decode("command", &value)?;
            command.raw = value;
            return Ok(Self::Command(command));
        }

        if value.get("name").is_some()
            || matches!(body_type, "block_suggestion" | "dialog_suggestion")
        {
            let mut options: OptionsRequest = decode("options", &value)?;
            options.raw = value;
            return Ok(Self::Options(options));
        }

        if value.get("actions").is_some()
            || matches!(
                body_type,
                "block_actions" | "interactive_message" | "dialog_submission"
            )
        {
            let mut action: ActionPayload = decode("action", &value)?;
            action.raw = value;
            return Ok(Self::Action(action));
        }

        if matches!(body_type, "shortcut" | "message_action") {
            let mut shortcut: ShortcutPayload = decode("shortcut", &value)?;
            shortcut.raw = value;
            return Ok(Self::Shortcut(shortcut));
        }

        if matches!(body_type, "view_submission" | "view_closed") {
            let mut view: ViewPayload = decode("view", &value)?;
            view.raw = value;
            return Ok(Self::View(view));
        }

        Err(EnvelopeError::Unrecognized)
    }

    /// Returns the category of this envelope.
    pub fn category(&self) -> EnvelopeCategory {
        match self {
            Self::Event(_) => EnvelopeCategory::Event,
            Self::Command(_) => EnvelopeCategory::Command,
            Self::Action(_) => EnvelopeCategory::Action,
            Self::Shortcut(_) => EnvelopeCategory::Shortcut,
            Self::View(_) => EnvelopeCategory::View,
            Self::Options(_) => EnvelopeCategory::Options,
        }
    }

    /// Returns the raw JSON body as received.
    pub fn raw(&self) -> &Value {
        match self {
            Self::Event(e) => &e.raw,
            Self::Command(c) => &c.raw,
            Self::Action(a) => &a.raw,
            Self::Shortcut(s) => &s.raw,
            Self::View(v) => &v.raw,
            Self::Options(o) => &o.raw,
        }
    }

    /// Returns the team the request originated from.
    pub fn team_id(&self) -> Option<&str> {
        match self {
            Self::Event(e) => e.team_id(),
            Self::Command(c) => c.team_id.as_deref(),
            Self::Action(a) => team_of(a.team.as_ref(), a.user.as_ref()),
            Self::Shortcut(s) => team_of(s.team.as_ref(), s.user.as_ref()),
            Self::View(v) => team_of(v.team.as_ref(), v.user.as_ref()),
            Self::Options(o) => team_of(o.team.as_ref(), o.user.as_ref()),
        }
    }

    /// Returns the enterprise the request originated from, if any.
    pub fn enterprise_id(&self) -> Option<&str> {
        match self {
            Self::Event(e) => e.enterprise_id(),
            Self::Command(c) => c.enterprise_id.as_deref(),
            Self::Action(a) => a.enterprise.as_ref().map(|e| e.id.as_str()),
            Self::Shortcut(s) => s.enterprise.as_ref().map(|e| e.id.as_str()),
            Self::View(v) => v.enterprise.as_ref().map(|e| e.id.as_str()),
            Self::Options(o) => o.enterprise.as_ref().map(|e| e.id.as_str()),
        }
    }

    /// Returns the user who triggered the request.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Event(e) => e.event.user_id(),
            Self::Command(c) => Some(c.user_id.as_str()),
            Self::Action(a) => a.user.as_ref().map(|u| u.id.as_str()),
            Self::Shortcut(s) => s.user.as_ref().map(|u| u.id.as_str()),
            Self::View(v) => v.user.as_ref().map(|u| u.id.as_str()),
            Self::Options(o) => o.user.as_ref().map(|u| u.id.as_str()),
        }
    }

    /// Returns the conversation (channel) the request happened in.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::Event(e) => e.event.channel_id(),
            Self::Command(c) => c.channel_id.as_deref(),
            Self::Action(a) => a.channel.as_ref().map(|c| c.id.as_str()),
            Self::Shortcut(s) => s.channel.as_ref().map(|c| c.id.as_str()),
            Self::View(_) => None,
            Self::Options(o) => o.channel.as_ref().map(|c| c.id.as_str()),
        }
    }

    /// Returns whether the app is installed org-wide for this request.
    pub fn is_enterprise_install(&self) -> bool {
        match self {
            Self::Event(e) => e
                .authorizations
                .first()
                .map(|a| a.is_enterprise_install)
                .unwrap_or(false),
            Self::Command(c) => c.is_enterprise_install,
            Self::Action(a) => a.is_enterprise_install,
            Self::Shortcut(s) => s.is_enterprise_install,
            Self::View(v) => v.is_enterprise_install,
            Self::Options(o) => o.is_enterprise_install,
        }
    }

    /// Returns the `response_url` attached to the request, if any.
    ///
    /// View submissions may carry several; the first one is used.
    pub fn response_url(&self) -> Option<&str> {
        match self {
            Self::Event(_) | Self::Options(_) => None,
            Self::Command(c) => c.response_url.as_deref(),
            Self::Action(a) => a.response_url.as_deref(),
            Self::Shortcut(s) => s.response_url.as_deref(),
            Self::View(v) => v.response_urls.first().map(|r| r.response_url.as_str()),
        }
    }

    /// Returns the event payload when this is an Events API envelope.
    pub fn as_event(&self) -> Option<&EventEnvelope> {
        match self {
            Self::Event(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the inner event when this is a `message` event.
    pub fn as_message(&self) -> Option<&EventBody> {
        self.as_event()
            .map(|e| &e.event)
            .filter(|body| body.event_type == "message")
    }
}

fn team_of<'a>(team: Option<&'a IdRef>, user: Option<&'a IdRef>) -> Option<&'a str> {
    team.map(|t| t.id.as_str())
        .or_else(|| user.and_then(|u| u.team_id.as_deref()))
}
