//! The outbound API seam.
//!
//! The core never talks to the platform directly. Everything outbound goes
//! through an [`ApiClient`], which the runtime provides (an HTTP client in
//! production, a recording fake in tests). [`Say`] and [`Respond`] are the
//! two request-scoped helpers built on top of it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// A platform API client.
#[async_trait]
pub trait ApiClient: Send + Sync + 'static {
    /// Calls a Web API method, e.g. `chat.postMessage`, and returns the
    /// response body of a successful call.
    async fn call(&self, method: &str, token: Option<&str>, params: Value) -> ApiResult<Value>;

    /// Posts a message body to a `response_url`.
    async fn post_response_url(&self, url: &str, body: Value) -> ApiResult<()>;
}

/// A shared, type-erased API client.
pub type BoxedClient = Arc<dyn ApiClient>;

/// A client that refuses every call.
///
/// Used when the application has not configured a client.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClient;

#[async_trait]
impl ApiClient for NoopClient {
    async fn call(&self, method: &str, _token: Option<&str>, _params: Value) -> ApiResult<Value> {
        debug!(method, "dropping API call, no client configured");
        Err(ApiError::NotConfigured)
    }

    async fn post_response_url(&self, _url: &str, _body: Value) -> ApiResult<()> {
        Err(ApiError::NotConfigured)
    }
}

// ============================================================================
// Outgoing Messages
// ============================================================================

/// A message body for [`Say`] or [`Respond`].
///
/// Plain strings become `{ "text": ... }`; JSON objects are sent as given.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage(Map<String, Value>);

impl OutgoingMessage {
    /// Returns the message as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }
}

impl From<&str> for OutgoingMessage {
    fn from(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

impl From<String> for OutgoingMessage {
    fn from(text: String) -> Self {
        let mut map = Map::new();
        map.insert("text".to_string(), Value::String(text));
        Self(map)
    }
}

impl From<Value> for OutgoingMessage {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::String(text) => Self::from(text),
            other => Self::from(other.to_string()),
        }
    }
}

// ============================================================================
// Say / Respond
// ============================================================================

/// Posts messages to the conversation a request came from.
#[derive(Clone)]
pub struct Say {
    client: BoxedClient,
    channel: String,
    token: Option<String>,
}

impl Say {
    pub fn new(client: BoxedClient, channel: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
            token,
        }
    }

    /// Returns the channel messages are posted to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Sends `chat.postMessage` to the request's conversation.
    pub async fn say(&self, message: impl Into<OutgoingMessage>) -> ApiResult<Value> {
        let mut message = message.into();
        message.insert("channel", self.channel.as_str());
        self.client
            .call("chat.postMessage", self.token.as_deref(), message.into_value())
            .await
    }
}

impl std::fmt::Debug for Say {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Say")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Posts messages to a request's `response_url`.
#[derive(Clone)]
pub struct Respond {
    client: BoxedClient,
    url: String,
}

impl Respond {
    pub fn new(client: BoxedClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Returns the response URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts a message to the response URL.
    pub async fn respond(&self, message: impl Into<OutgoingMessage>) -> ApiResult<()> {
        self.client
            .post_response_url(&self.url, message.into().into_value())
            .await
    }

    /// Replaces the message the interaction originated from.
    pub async fn replace_original(&self, message: impl Into<OutgoingMessage>) -> ApiResult<()> {
        let mut message = message.into();
        message.insert("replace_original", true);
        self.client
            .post_response_url(&self.url, message.into_value())
            .await
    }

    /// Deletes the message the interaction originated from.
    pub async fn delete_original(&self) -> ApiResult<()> {
        self.client
            .post_response_url(&self.url, json!({ "delete_original": true }))
            .await
    }
}

impl std::fmt::Debug for Respond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Respond")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
