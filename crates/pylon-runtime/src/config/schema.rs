//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use pylon_core::{AuthorizeResult, DEFAULT_UNHANDLED_TIMEOUT};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PylonConfig {
    /// Application credentials and request handling.
    #[serde(default)]
    pub app: AppConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// App
// =============================================================================

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bot token for single-workspace apps.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// The app's bot id, used to drop its own events.
    #[serde(default)]
    pub bot_id: Option<String>,

    /// The app's bot user id, used to drop its own events and detect mentions.
    #[serde(default)]
    pub bot_user_id: Option<String>,

    /// Register the `ignore_self` middleware.
    #[serde(default = "default_true")]
    pub ignore_self: bool,

    /// Keep conversation state in an in-process store.
    #[serde(default = "default_true")]
    pub conversation_store: bool,

    /// Hold the acknowledgment body until all listeners have finished.
    #[serde(default)]
    pub process_before_response: bool,

    /// How long to wait before reporting an unacknowledged request.
    #[serde(default = "default_unhandled_request_timeout_ms")]
    pub unhandled_request_timeout_ms: u64,

    /// Base URL of the Web API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout for outbound API calls in milliseconds.
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_id: None,
            bot_user_id: None,
            ignore_self: true,
            conversation_store: true,
            process_before_response: false,
            unhandled_request_timeout_ms: default_unhandled_request_timeout_ms(),
            api_url: default_api_url(),
            api_timeout_ms: default_api_timeout_ms(),
        }
    }
}

impl AppConfig {
    pub fn unhandled_request_timeout(&self) -> Duration {
        Duration::from_millis(self.unhandled_request_timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    /// Returns the fixed credentials configured for a single-workspace app.
    pub fn authorize_result(&self) -> Option<AuthorizeResult> {
        let bot_token = self.bot_token.clone()?;
        Some(AuthorizeResult {
            bot_token: Some(bot_token),
            bot_id: self.bot_id.clone(),
            bot_user_id: self.bot_user_id.clone(),
            ..AuthorizeResult::default()
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_unhandled_request_timeout_ms() -> u64 {
    DEFAULT_UNHANDLED_TIMEOUT.as_millis() as u64
}

fn default_api_url() -> String {
    "https://slack.com/api/".to_string()
}

fn default_api_timeout_ms() -> u64 {
    30000
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `compact` otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How often the log file is rotated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-module levels, e.g. `pylon_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}
