//! The per-request context.
//!
//! A [`Context`] is created fresh for every dispatch and shared through the
//! request's middleware chain and listeners behind an `Arc`. Fields derived
//! while building the context (identity, authorization, retry metadata) are
//! read-only afterwards; the regex matches, conversation state, custom
//! properties and typed state use interior mutability so middleware can
//! write values that later steps of the same request observe.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::trace;

use crate::conversation::{ConversationState, ConversationStore};
use crate::envelope::Envelope;
use crate::error::{PylonError, PylonResult};

/// Context keys that custom properties may not shadow.
pub const RESERVED_KEYS: &[&str] = &[
    "team_id",
    "enterprise_id",
    "user_id",
    "conversation_id",
    "is_enterprise_install",
    "bot_token",
    "user_token",
    "bot_id",
    "bot_user_id",
    "retry_num",
    "retry_reason",
    "matches",
    "conversation",
];

// ============================================================================
// Authorization
// ============================================================================

/// Identity fields handed to the authorize function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizeSource {
    pub team_id: Option<String>,
    pub enterprise_id: Option<String>,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub is_enterprise_install: bool,
}

impl AuthorizeSource {
    /// Collects the identity fields of an envelope.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            team_id: envelope.team_id().map(str::to_string),
            enterprise_id: envelope.enterprise_id().map(str::to_string),
            user_id: envelope.user_id().map(str::to_string),
            conversation_id: envelope.conversation_id().map(str::to_string),
            is_enterprise_install: envelope.is_enterprise_install(),
        }
    }
}

/// Credentials and bot identity resolved for a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizeResult {
    pub bot_token: Option<String>,
    pub user_token: Option<String>,
    pub bot_id: Option<String>,
    pub bot_user_id: Option<String>,
    pub team_id: Option<String>,
    pub enterprise_id: Option<String>,
}

impl AuthorizeResult {
    /// Creates a result holding just a bot token.
    pub fn with_bot_token(token: impl Into<String>) -> Self {
        Self {
            bot_token: Some(token.into()),
            ..Self::default()
        }
    }
}

// ============================================================================
// Conversation Handle
// ============================================================================

struct ConversationHandle {
    store: Arc<dyn ConversationStore>,
    key: String,
    state: Option<ConversationState>,
}

// ============================================================================
// Context
// ============================================================================

/// Per-request derived data.
pub struct Context {
    source: AuthorizeSource,
    auth: AuthorizeResult,
    retry_num: Option<u32>,
    retry_reason: Option<String>,
    custom: RwLock<Map<String, Value>>,
    matches: RwLock<Vec<Option<String>>>,
    conversation: Mutex<Option<ConversationHandle>>,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Context {
    /// Creates a context from the request identity and its authorization.
    ///
    /// Team and enterprise ids reported by the authorize function fill in
    /// whatever the envelope did not carry.
    pub fn new(mut source: AuthorizeSource, auth: AuthorizeResult) -> Self {
        if source.team_id.is_none() {
            source.team_id = auth.team_id.clone();
        }
        if source.enterprise_id.is_none() {
            source.enterprise_id = auth.enterprise_id.clone();
        }
        Self {
            source,
            auth,
            retry_num: None,
            retry_reason: None,
            custom: RwLock::new(Map::new()),
            matches: RwLock::new(Vec::new()),
            conversation: Mutex::new(None),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Records the transport's retry metadata.
    pub fn with_retry(mut self, retry_num: Option<u32>, retry_reason: Option<String>) -> Self {
        self.retry_num = retry_num;
        self.retry_reason = retry_reason;
        self
    }

    /// Attaches a conversation store and the record loaded from it.
    pub fn with_conversation(
        self,
        store: Arc<dyn ConversationStore>,
        key: impl Into<String>,
        state: Option<ConversationState>,
    ) -> Self {
        *self.conversation.lock() = Some(ConversationHandle {
            store,
            key: key.into(),
            state,
        });
        self
    }

    // ─── Identity ─────────────────────────────────────────────────────────────

    pub fn team_id(&self) -> Option<&str> {
        self.source.team_id.as_deref()
    }

    pub fn enterprise_id(&self) -> Option<&str> {
        self.source.enterprise_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.source.user_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.source.conversation_id.as_deref()
    }

    pub fn is_enterprise_install(&self) -> bool {
        self.source.is_enterprise_install
    }

    // ─── Authorization ────────────────────────────────────────────────────────

    /// Returns the full authorization result.
    pub fn authorization(&self) -> &AuthorizeResult {
        &self.auth
    }

    pub fn bot_token(&self) -> Option<&str> {
        self.auth.bot_token.as_deref()
    }

    pub fn user_token(&self) -> Option<&str> {
        self.auth.user_token.as_deref()
    }

    pub fn bot_id(&self) -> Option<&str> {
        self.auth.bot_id.as_deref()
    }

    pub fn bot_user_id(&self) -> Option<&str> {
        self.auth.bot_user_id.as_deref()
    }

    // ─── Retries ──────────────────────────────────────────────────────────────

    /// How many times the platform has retried this request.
    pub fn retry_num(&self) -> Option<u32> {
        self.retry_num
    }

    /// Why the platform retried this request, e.g. `http_timeout`.
    pub fn retry_reason(&self) -> Option<&str> {
        self.retry_reason.as_deref()
    }

    // ─── Custom properties ────────────────────────────────────────────────────

    /// Sets a custom property.
    ///
    /// Fails with [`PylonError::InvalidCustomProperty`] for names that
    /// collide with a built-in context field.
    pub fn insert_custom(&self, key: impl Into<String>, value: Value) -> PylonResult<()> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(PylonError::InvalidCustomProperty(key));
        }
        self.custom.write().insert(key, value);
        Ok(())
    }

    /// Returns a custom property.
    pub fn custom(&self, key: &str) -> Option<Value> {
        self.custom.read().get(key).cloned()
    }

    /// Returns a copy of all custom properties.
    pub fn custom_properties(&self) -> Map<String, Value> {
        self.custom.read().clone()
    }

    // ─── Matches ──────────────────────────────────────────────────────────────

    /// Returns the capture groups of the pattern that matched the request.
    ///
    /// Index 0 is the whole match. Populated per listener before its
    /// middleware runs.
    pub fn matches(&self) -> Vec<Option<String>> {
        self.matches.read().clone()
    }

    /// Returns a single capture group.
    pub fn capture(&self, index: usize) -> Option<String> {
        self.matches.read().get(index).cloned().flatten()
    }

    pub fn set_matches(&self, matches: Vec<Option<String>>) {
        *self.matches.write() = matches;
    }

    // ─── Conversation ─────────────────────────────────────────────────────────

    /// Returns the conversation state loaded for this request.
    pub fn conversation(&self) -> Option<ConversationState> {
        self.conversation
            .lock()
            .as_ref()
            .and_then(|handle| handle.state.clone())
    }

    /// Returns `true` if a conversation store is attached.
    pub fn has_conversation_store(&self) -> bool {
        self.conversation.lock().is_some()
    }

    /// Saves new conversation state.
    ///
    /// The new state is visible to the rest of this request immediately and
    /// to later requests once the store write completes.
    pub async fn update_conversation(
        &self,
        state: ConversationState,
        expires_at: Option<Instant>,
    ) -> PylonResult<()> {
        let (store, key) = self.conversation_target()?;
        trace!(key, "updating conversation");
        store.set(&key, state.clone(), expires_at).await?;
        if let Some(handle) = self.conversation.lock().as_mut() {
            handle.state = Some(state);
        }
        Ok(())
    }

    /// Ends the conversation, deleting its stored state.
    pub async fn complete_conversation(&self) -> PylonResult<()> {
        let (store, key) = self.conversation_target()?;
        trace!(key, "completing conversation");
        store.delete(&key).await?;
        if let Some(handle) = self.conversation.lock().as_mut() {
            handle.state = None;
        }
        Ok(())
    }

    fn conversation_target(&self) -> PylonResult<(Arc<dyn ConversationStore>, String)> {
        self.conversation
            .lock()
            .as_ref()
            .map(|handle| (Arc::clone(&handle.store), handle.key.clone()))
            .ok_or(PylonError::ContextMissing("conversation"))
    }

    // ─── Typed state ──────────────────────────────────────────────────────────

    /// Stores a value in the request-scoped state map.
    ///
    /// Only one value per type can be stored; subsequent calls overwrite.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a cloned value from the state map.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn has_state<T: 'static>(&self) -> bool {
        self.state.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns a value from the state map.
    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("team_id", &self.source.team_id)
            .field("enterprise_id", &self.source.enterprise_id)
            .field("user_id", &self.source.user_id)
            .field("conversation_id", &self.source.conversation_id)
            .field("retry_num", &self.retry_num)
            .finish_non_exhaustive()
    }
}
