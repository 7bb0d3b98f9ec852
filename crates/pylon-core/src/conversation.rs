//! Conversation state storage.
//!
//! A conversation store correlates a conversation key (`team:channel`) with
//! state saved by a previous request, so multi-step flows can pick up where
//! they left off. The store is the only mutable resource shared across
//! requests.
//!
//! [`MemoryStore`] is the default backend. Each `get`/`set`/`delete` is atomic
//! for a single key, but nothing serializes a read-then-write sequence across
//! two in-flight requests: the last writer wins.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::trace;

use crate::error::StoreError;

/// State saved for a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Arbitrary application data.
    #[serde(default)]
    pub data: Value,
    /// The name of the step the conversation should continue with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

impl ConversationState {
    /// Creates a state holding `data`.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            next_step: None,
        }
    }

    /// Sets the step the conversation continues with.
    pub fn with_next_step(mut self, step: impl Into<String>) -> Self {
        self.next_step = Some(step.into());
        self
    }
}

/// Builds the store key for a conversation.
///
/// The enterprise id is used for org-wide installs, the team id otherwise.
pub fn conversation_key(
    team_id: Option<&str>,
    enterprise_id: Option<&str>,
    is_enterprise_install: bool,
    conversation_id: &str,
) -> Option<String> {
    let owner = if is_enterprise_install {
        enterprise_id.or(team_id)
    } else {
        team_id.or(enterprise_id)
    }?;
    Some(format!("{owner}:{conversation_id}"))
}

/// Pluggable storage for conversation state.
#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    /// Stores `state` under `key`, replacing any previous record.
    ///
    /// A record with `expires_at` set is treated as absent once that instant
    /// has passed.
    async fn set(
        &self,
        key: &str,
        state: ConversationState,
        expires_at: Option<Instant>,
    ) -> Result<(), StoreError>;

    /// Loads the record stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<ConversationState>, StoreError>;

    /// Removes the record stored under `key`, returning whether one existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

#[derive(Debug)]
struct Record {
    state: ConversationState,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// An in-process conversation store.
///
/// Expired records are removed lazily when they are read; there is no
/// background sweep.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn set(
        &self,
        key: &str,
        state: ConversationState,
        expires_at: Option<Instant>,
    ) -> Result<(), StoreError> {
        trace!(key, "saving conversation state");
        self.records
            .lock()
            .insert(key.to_string(), Record { state, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ConversationState>, StoreError> {
        let mut records = self.records.lock();
        let Some(record) = records.get(key) else {
            return Ok(None);
        };

        if record.is_expired(Instant::now()) {
            trace!(key, "conversation state expired");
            records.remove(key);
            return Ok(None);
        }

        Ok(Some(record.state.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().remove(key).is_some())
    }
}
