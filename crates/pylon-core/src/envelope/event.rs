//! Events API envelopes.

use serde::Deserialize;
use serde_json::Value;

/// One entry of the `authorizations` array on an event callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub enterprise_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_enterprise_install: bool,
}

/// The outer `event_callback` wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub enterprise_id: Option<String>,
    #[serde(default)]
    pub api_app_id: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_time: Option<i64>,
    #[serde(default)]
    pub is_ext_shared_channel: bool,
    #[serde(default)]
    pub authorizations: Vec<Authorization>,
    /// The inner event.
    pub event: EventBody,
    /// The raw callback body.
    #[serde(skip)]
    pub raw: Value,
}

impl EventEnvelope {
    /// Returns the team id, falling back to the first authorization.
    pub fn team_id(&self) -> Option<&str> {
        self.team_id
            .as_deref()
            .or_else(|| self.authorizations.first()?.team_id.as_deref())
    }

    /// Returns the enterprise id, falling back to the first authorization.
    pub fn enterprise_id(&self) -> Option<&str> {
        self.enterprise_id
            .as_deref()
            .or_else(|| self.authorizations.first()?.enterprise_id.as_deref())
    }
}

/// The inner event of an event callback.
///
/// Only the fields the dispatcher inspects are typed. Event-specific data is
/// available through [`raw`](Self::raw).
#[derive(Debug, Clone, Deserialize)]
pub struct EventBody {
    /// The event type, e.g. `message` or `app_mention`.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    /// A user id string for most events, a user object for `user_change` and friends.
    #[serde(default)]
    user: Option<Value>,
    /// A channel id string for most events, a channel object for `channel_created`.
    #[serde(default)]
    channel: Option<Value>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    item: Option<Value>,
    /// The raw inner event.
    #[serde(skip)]
    pub raw: Value,
}

fn id_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("id").and_then(Value::as_str),
        _ => None,
    }
}

impl EventBody {
    /// Returns the id of the user the event is about.
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().and_then(id_of)
    }

    /// Returns the channel the event happened in.
    ///
    /// Looks at `channel`, then `channel_id`, then `item.channel` (reactions,
    /// pins and stars carry it there).
    pub fn channel_id(&self) -> Option<&str> {
        self.channel
            .as_ref()
            .and_then(id_of)
            .or(self.channel_id.as_deref())
            .or_else(|| self.item.as_ref()?.get("channel")?.as_str())
    }

    /// Returns `true` if this is a `message` event without a subtype.
    pub fn is_plain_message(&self) -> bool {
        self.event_type == "message" && self.subtype.is_none()
    }
}
