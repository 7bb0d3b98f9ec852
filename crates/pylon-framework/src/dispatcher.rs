//! Request dispatcher for the Pylon framework.
//!
//! The [`Dispatcher`] receives normalized [`ReceiverEvent`]s from a transport
//! and drives them through the pipeline:
//!
//! 1. Build the [`Context`](pylon_core::Context) (authorization, conversation state)
//! 2. Acknowledge Events API envelopes, which carry no response
//! 3. Run the global middleware chain
//! 4. Run every matching listener, in registration order
//! 5. Report failures to the error handler
//!
//! ```rust,ignore
//! use pylon_framework::{Dispatcher, on_command, on_message};
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher
//!     .use_middleware(ignore_self)
//!     .add(on_message("hello").handler(say_hello))
//!     .add(on_command("/deploy").middleware(only_admins).handler(deploy));
//!
//! dispatcher.process_event(event).await?;
//! ```
//!
//! # Tower Service Integration
//!
//! `Dispatcher` implements `tower::Service<ReceiverEvent>`, so transports can
//! wrap it in tower layers such as timeouts or concurrency limits.

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use pylon_core::{
    AckResponse, BoxedClient, ConversationStore, Envelope, NoopClient, PylonError, PylonResult,
    ReceiverEvent,
};
use tower::Service;
use tracing::{Instrument, debug, debug_span, error, trace};

use crate::constraint::{
    ActionConstraint, Matcher, MessagePattern, OptionsConstraint, ShortcutConstraint,
    ViewConstraint,
};
use crate::context_builder::{Authorize, ContextBuilder};
use crate::handler::{BoxFuture, Handler};
use crate::listener::{
    Listener, ListenerRegistry, Matched, on_action, on_command, on_event, on_message, on_options,
    on_shortcut, on_view,
};
use crate::middleware::{BoxedMiddleware, ChainOutcome, Middleware, Terminal, run_chain};
use crate::request::Request;

// ============================================================================
// Error Handler
// ============================================================================

/// What an error handler knows about the failed request.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The envelope being processed.
    pub envelope: Arc<Envelope>,
    /// The request, if the context was built before the failure.
    pub request: Option<Arc<Request>>,
    /// The acknowledgment body stored in process-before-response mode.
    pub stored_response: Option<AckResponse>,
}

/// Receives every error raised while processing a request.
///
/// Implemented for async closures. The handler's result becomes the result
/// of [`Dispatcher::process_event`], so returning `Ok(())` marks the error as
/// handled.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, error: PylonError, ctx: ErrorContext) -> BoxFuture<'static, PylonResult<()>>;
}

impl<F, Fut> ErrorHandler for F
where
    F: Fn(PylonError, ErrorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PylonResult<()>> + Send + 'static,
{
    fn handle(&self, error: PylonError, ctx: ErrorContext) -> BoxFuture<'static, PylonResult<()>> {
        Box::pin(self(error, ctx))
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// The central request dispatcher.
///
/// Cloning is cheap; clones share middleware, listeners and handlers.
#[derive(Clone)]
pub struct Dispatcher {
    middleware: Arc<[BoxedMiddleware]>,
    listeners: Arc<ListenerRegistry>,
    context_builder: ContextBuilder,
    client: BoxedClient,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with no middleware or listeners.
    ///
    /// Requests are authorized with an empty [`SingleTeamAuthorization`](crate::SingleTeamAuthorization)
    /// and API calls fail with [`ApiError::NotConfigured`](pylon_core::ApiError::NotConfigured)
    /// until a client is set.
    pub fn new() -> Self {
        Self {
            middleware: Arc::from(Vec::new()),
            listeners: Arc::new(ListenerRegistry::new()),
            context_builder: ContextBuilder::default(),
            client: Arc::new(NoopClient),
            error_handler: None,
        }
    }

    // ─── Configuration ──────────────────────────────────────────────────────

    /// Sets the authorize implementation used to build contexts.
    pub fn authorize(&mut self, authorize: impl Authorize) -> &mut Self {
        self.context_builder = self.context_builder.clone().authorize(authorize);
        self
    }

    /// Enables conversation state using `store`.
    pub fn conversation_store(&mut self, store: Arc<dyn ConversationStore>) -> &mut Self {
        self.context_builder = self.context_builder.clone().conversation_store(store);
        self
    }

    /// Sets the API client handed to every request.
    pub fn client(&mut self, client: BoxedClient) -> &mut Self {
        self.client = client;
        self
    }

    /// Sets the error handler, replacing any previous one.
    pub fn error(&mut self, handler: impl ErrorHandler) -> &mut Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    // ─── Registration ───────────────────────────────────────────────────────

    /// Appends a global middleware.
    ///
    /// Global middleware runs for every request, before any listener.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        let mut chain = self.middleware.to_vec();
        chain.push(Arc::new(middleware));
        self.middleware = chain.into();
        self
    }

    /// Registers a listener.
    ///
    /// Listeners run in the order they are added.
    pub fn add(&mut self, listener: Listener) -> &mut Self {
        Arc::make_mut(&mut self.listeners).push(listener);
        self
    }

    /// Registers a listener (builder pattern).
    pub fn with(mut self, listener: Listener) -> Self {
        self.add(listener);
        self
    }

    /// Registers a handler for Events API events of the given type.
    pub fn event<F, T>(&mut self, event_type: impl Into<Matcher>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.add(on_event(event_type).handler(handler))
    }

    /// Registers a handler for plain messages matching `pattern`.
    pub fn message<F, T>(&mut self, pattern: impl Into<MessagePattern>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.add(on_message(pattern).handler(handler))
    }

    /// Registers a handler for a slash command.
    pub fn command<F, T>(&mut self, command: impl Into<Matcher>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.add(on_command(command).handler(handler))
    }

    /// Registers a handler for interactive actions.
    pub fn action<F, T>(&mut self, constraint: impl Into<ActionConstraint>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.add(on_action(constraint).handler(handler))
    }

    /// Registers a handler for shortcuts.
    pub fn shortcut<F, T>(
        &mut self,
        constraint: impl Into<ShortcutConstraint>,
        handler: F,
    ) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.add(on_shortcut(constraint).handler(handler))
    }

    /// Registers a handler for view submissions or closures.
    pub fn view<F, T>(&mut self, constraint: impl Into<ViewConstraint>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.add(on_view(constraint).handler(handler))
    }

    /// Registers a handler for options requests.
    pub fn options<F, T>(
        &mut self,
        constraint: impl Into<OptionsConstraint>,
        handler: F,
    ) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.add(on_options(constraint).handler(handler))
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns the number of global middleware.
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    // ─── Dispatch ───────────────────────────────────────────────────────────

    /// Processes one inbound request.
    ///
    /// Every error is reported exactly once: to the error handler if one is
    /// registered, otherwise with `tracing::error!`. Without a handler the
    /// error is also returned; with one, the handler's result is returned.
    pub async fn process_event(&self, event: ReceiverEvent) -> PylonResult<()> {
        let span = debug_span!(
            "dispatch",
            category = %event.body.category(),
            retry_num = ?event.retry_num,
        );
        self.dispatch(event).instrument(span).await
    }

    async fn dispatch(&self, event: ReceiverEvent) -> PylonResult<()> {
        let envelope = Arc::clone(&event.body);

        let context = match self.context_builder.build(&envelope, &event).await {
            Ok(context) => context,
            Err(error) => {
                debug!(error = %error, "failed to build request context");
                let ctx = ErrorContext {
                    envelope,
                    request: None,
                    stored_response: event.ack.stored_response(),
                };
                return self.report(error, ctx).await;
            }
        };

        let request = Arc::new(Request::new(
            Arc::clone(&envelope),
            context,
            event.ack.clone(),
            Arc::clone(&self.client),
        ));

        match self.run(Arc::clone(&request)).await {
            Ok(()) => Ok(()),
            Err(error) => {
                let ctx = ErrorContext {
                    envelope,
                    request: Some(request),
                    stored_response: event.ack.stored_response(),
                };
                self.report(error, ctx).await
            }
        }
    }

    async fn run(&self, request: Arc<Request>) -> PylonResult<()> {
        if matches!(request.envelope(), Envelope::Event(_)) && !request.ack().is_acknowledged() {
            request.ack().ack().await?;
        }

        let listeners = Arc::clone(&self.listeners);
        let terminal: Terminal = Box::new(move |request: Arc<Request>| {
            Box::pin(async move { run_listeners(&listeners, request).await })
        });

        let outcome = run_chain(Arc::clone(&self.middleware), request, Some(terminal)).await?;
        if outcome == ChainOutcome::ShortCircuited {
            debug!("global middleware stopped the request");
        }
        Ok(())
    }

    async fn report(&self, error: PylonError, ctx: ErrorContext) -> PylonResult<()> {
        match &self.error_handler {
            Some(handler) => handler.handle(error, ctx).await,
            None => {
                error!(code = %error.code(), error = %error, "unhandled error while processing request");
                Err(error)
            }
        }
    }
}

/// Runs every listener matching the request and merges their errors.
async fn run_listeners(registry: &ListenerRegistry, request: Arc<Request>) -> PylonResult<()> {
    let matched = registry.matching(request.envelope());
    if matched.is_empty() {
        debug!(category = %request.envelope().category(), "no listener matched");
        return Ok(());
    }

    let mut errors = Vec::new();
    for Matched { listener, captures } in matched {
        let name = listener.name().unwrap_or("unnamed");
        match listener.run(Arc::clone(&request), captures).await {
            Ok(outcome) => trace!(listener = name, ?outcome, "listener finished"),
            Err(error) => {
                debug!(listener = name, error = %error, "listener failed");
                errors.push(error);
            }
        }
    }

    if errors.len() > 1 {
        return Err(PylonError::MultipleListeners(errors));
    }
    errors.pop().map_or(Ok(()), Err)
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("middleware_count", &self.middleware.len())
            .field("listener_count", &self.listeners.len())
            .field("context_builder", &self.context_builder)
            .field("has_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

// ============================================================================
// Tower Service Implementation
// ============================================================================

impl Service<ReceiverEvent> for Dispatcher {
    type Response = ();
    type Error = PylonError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: ReceiverEvent) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { dispatcher.process_event(event).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Next;
    use parking_lot::Mutex;
    use pylon_core::{AckState, AckTracker};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(body: Value) -> ReceiverEvent {
        ReceiverEvent::detached(Envelope::from_value(body).unwrap())
    }

    fn app_mention() -> ReceiverEvent {
        event(json!({
            "team_id": "T1",
            "event": { "type": "app_mention", "text": "<@B1> hi", "channel": "C1", "user": "U1" }
        }))
    }

    #[tokio::test]
    async fn dispatch_without_listeners_is_ok() {
        let dispatcher = Dispatcher::new();
        dispatcher.process_event(app_mention()).await.unwrap();
    }

    #[tokio::test]
    async fn events_are_acknowledged_automatically() {
        let dispatcher = Dispatcher::new();
        let event = app_mention();
        let ack = event.ack.clone();

        dispatcher.process_event(event).await.unwrap();
        assert_eq!(ack.tracker().state(), AckState::Acknowledged);
    }

    #[tokio::test]
    async fn commands_are_left_for_the_listener() {
        let tracker = AckTracker::detached();
        let event = ReceiverEvent::new(
            Envelope::from_value(json!({
                "command": "/deploy",
                "text": "prod",
                "team_id": "T1",
                "user_id": "U1",
                "channel_id": "C1"
            }))
            .unwrap(),
            tracker.ack_fn(),
        );

        Dispatcher::new().process_event(event).await.unwrap();
        assert_eq!(tracker.state(), AckState::Pending);
    }

    #[tokio::test]
    async fn error_handler_is_replaced_on_reregistration() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::new();
        let counter = Arc::clone(&first);
        dispatcher.error(move |_error: PylonError, _ctx: ErrorContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<(), PylonError>(()) }
        });
        let counter = Arc::clone(&second);
        dispatcher.error(move |_error: PylonError, _ctx: ErrorContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<(), PylonError>(()) }
        });

        let failing = |_req: Arc<Request>, _next: Next| async {
            Err::<(), _>(PylonError::ContextMissing("test"))
        };
        dispatcher.use_middleware(failing);

        dispatcher.process_event(app_mention()).await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_context_carries_the_request() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .error(move |error: PylonError, ctx: ErrorContext| {
                *seen_clone.lock() = Some((error.code(), ctx.request.is_some()));
                async { Ok::<(), PylonError>(()) }
            })
            .event("app_mention", || async {
                Err::<(), PylonError>(PylonError::ContextMissing("test"))
            });

        dispatcher.process_event(app_mention()).await.unwrap();
        assert_eq!(
            *seen.lock(),
            Some((pylon_core::ErrorCode::ContextMissing, true))
        );
    }

    #[tokio::test]
    async fn works_as_a_tower_service() {
        use tower::ServiceExt;

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let dispatcher = Dispatcher::new().with(on_event("app_mention").handler(move || {
            let count = Arc::clone(&count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        }));

        dispatcher.oneshot(app_mention()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
