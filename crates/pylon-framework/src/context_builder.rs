//! Builds the per-request [`Context`] before any middleware runs.
//!
//! The builder resolves credentials through the configured [`Authorize`]
//! implementation, loads conversation state when a store is configured and
//! copies the transport's retry metadata and custom properties.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use pylon_core::{
    AuthorizationError, AuthorizeResult, AuthorizeSource, BoxError, Context, ConversationStore,
    Envelope, PylonResult, ReceiverEvent, conversation_key,
};
use tracing::{debug, trace};

/// Event types delivered after the installation is gone.
const SKIP_AUTHORIZATION_EVENTS: &[&str] = &["app_uninstalled", "tokens_revoked"];

// ============================================================================
// Authorize
// ============================================================================

/// Resolves credentials for an incoming request.
///
/// Implemented for async closures taking an [`AuthorizeSource`]:
///
/// ```rust,ignore
/// let authorize = |source: AuthorizeSource| async move {
///     let installation = installations.find(source.team_id.as_deref()).await?;
///     Ok::<_, BoxError>(AuthorizeResult::with_bot_token(installation.bot_token))
/// };
/// ```
#[async_trait]
pub trait Authorize: Send + Sync + 'static {
    async fn authorize(&self, source: &AuthorizeSource) -> Result<AuthorizeResult, BoxError>;
}

#[async_trait]
impl<F, Fut> Authorize for F
where
    F: Fn(AuthorizeSource) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AuthorizeResult, BoxError>> + Send + 'static,
{
    async fn authorize(&self, source: &AuthorizeSource) -> Result<AuthorizeResult, BoxError> {
        self(source.clone()).await
    }
}

/// Authorizes every request with one fixed set of credentials.
///
/// Used by apps installed in a single workspace.
#[derive(Debug, Clone, Default)]
pub struct SingleTeamAuthorization {
    result: AuthorizeResult,
}

impl SingleTeamAuthorization {
    pub fn new(result: AuthorizeResult) -> Self {
        Self { result }
    }

    pub fn from_bot_token(token: impl Into<String>) -> Self {
        Self::new(AuthorizeResult::with_bot_token(token))
    }
}

#[async_trait]
impl Authorize for SingleTeamAuthorization {
    async fn authorize(&self, _source: &AuthorizeSource) -> Result<AuthorizeResult, BoxError> {
        Ok(self.result.clone())
    }
}

// ============================================================================
// ContextBuilder
// ============================================================================

/// Creates a [`Context`] for each request.
#[derive(Clone)]
pub struct ContextBuilder {
    authorize: Arc<dyn Authorize>,
    store: Option<Arc<dyn ConversationStore>>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(SingleTeamAuthorization::default())
    }
}

impl ContextBuilder {
    pub fn new(authorize: impl Authorize) -> Self {
        Self {
            authorize: Arc::new(authorize),
            store: None,
        }
    }

    /// Replaces the authorize implementation.
    pub fn authorize(mut self, authorize: impl Authorize) -> Self {
        self.authorize = Arc::new(authorize);
        self
    }

    /// Enables conversation state using `store`.
    pub fn conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the context for `event`.
    ///
    /// # Errors
    ///
    /// - [`AuthorizationError::MissingTeamId`] if the envelope carries no team
    ///   id and is not an enterprise install
    /// - [`AuthorizationError::Failed`] if the authorize function fails
    /// - [`PylonError::Store`](pylon_core::PylonError::Store) if loading conversation state fails
    /// - [`PylonError::InvalidCustomProperty`](pylon_core::PylonError::InvalidCustomProperty) for reserved custom property names
    pub async fn build(&self, envelope: &Envelope, event: &ReceiverEvent) -> PylonResult<Context> {
        let source = AuthorizeSource::from_envelope(envelope);

        let auth = if skips_authorization(envelope) {
            debug!("skipping authorization for an uninstall event");
            AuthorizeResult::default()
        } else {
            if source.team_id.is_none() && !source.is_enterprise_install {
                return Err(AuthorizationError::MissingTeamId.into());
            }
            self.authorize
                .authorize(&source)
                .await
                .map_err(|source| AuthorizationError::Failed { source })?
        };

        let context = Context::new(source, auth)
            .with_retry(event.retry_num, event.retry_reason.clone());

        for (key, value) in &event.custom_properties {
            context.insert_custom(key.clone(), value.clone())?;
        }

        let Some(store) = &self.store else {
            return Ok(context);
        };
        let Some(key) = context.conversation_id().and_then(|conversation_id| {
            conversation_key(
                context.team_id(),
                context.enterprise_id(),
                context.is_enterprise_install(),
                conversation_id,
            )
        }) else {
            return Ok(context);
        };

        let state = store.get(&key).await?;
        trace!(key, found = state.is_some(), "loaded conversation state");
        Ok(context.with_conversation(Arc::clone(store), key, state))
    }
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("conversation_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

fn skips_authorization(envelope: &Envelope) -> bool {
    envelope
        .as_event()
        .is_some_and(|e| SKIP_AUTHORIZATION_EVENTS.contains(&e.event.event_type.as_str()))
}
