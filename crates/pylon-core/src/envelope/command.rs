//! Slash command payloads.

use serde::Deserialize;
use serde_json::Value;

use super::flexible_bool;

/// A slash command invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct SlashCommand {
    /// The command name including the leading slash, e.g. `/deploy`.
    pub command: String,
    /// Everything the user typed after the command name.
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub team_domain: Option<String>,
    #[serde(default)]
    pub enterprise_id: Option<String>,
    #[serde(default)]
    pub api_app_id: Option<String>,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_enterprise_install: bool,
    #[serde(skip)]
    pub raw: Value,
}
