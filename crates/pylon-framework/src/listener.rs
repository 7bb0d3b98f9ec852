//! Listeners and the listener registry.
//!
//! A [`Listener`] is a constraint, an ordered list of listener-scoped
//! middleware and a terminal handler. Listeners are built with the `on_*`
//! functions and collected in a [`ListenerRegistry`] owned by the dispatcher.
//!
//! ```rust,ignore
//! use pylon_framework::{on_action, on_message};
//!
//! let hello = on_message("hello").handler(say_hello);
//! let approve = on_action(ActionConstraint::action_id("approve").with_block_id("request"))
//!     .middleware(only_admins)
//!     .handler(approve_request);
//! ```
//!
//! # Matching
//!
//! All listeners whose constraint matches an envelope run, in registration
//! order. Only listeners of a category compatible with the envelope are
//! tested; `message` events are seen by both event and message listeners,
//! interleaved in the order they were registered.
//!
//! # Tower Service Integration
//!
//! `Listener` implements `tower::Service<Arc<Request>>`, so a single listener
//! can be wrapped in tower layers or driven directly in tests.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use pylon_core::{Envelope, PylonResult};
use tower::Service;
use tracing::{debug, trace};

use crate::constraint::{
    ActionConstraint, Captures, CommandConstraint, Constraint, EventConstraint, ListenerCategory,
    Matcher, MessageConstraint, MessagePattern, OptionsConstraint, ShortcutConstraint,
    SubtypeFilter, ViewConstraint,
};
use crate::handler::{BoxFuture, BoxedHandler, Handler, into_handler};
use crate::middleware::{BoxedMiddleware, ChainOutcome, Middleware, Terminal, run_chain};
use crate::request::Request;

// ============================================================================
// Listener
// ============================================================================

struct ListenerInner {
    name: Option<String>,
    constraint: Constraint,
    middleware: Arc<[BoxedMiddleware]>,
    handler: BoxedHandler,
}

/// A registered listener.
///
/// Cloning is cheap; clones share the same constraint, chain and handler.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Returns the category this listener is registered under.
    pub fn category(&self) -> ListenerCategory {
        self.inner.constraint.category()
    }

    pub fn constraint(&self) -> &Constraint {
        &self.inner.constraint
    }

    /// Returns the name of this listener, if set.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Returns the number of listener-scoped middleware.
    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.len()
    }

    /// Tests the constraint against an envelope.
    pub fn test(&self, envelope: &Envelope) -> Option<Captures> {
        self.inner.constraint.test(envelope)
    }

    /// Runs the listener's middleware chain and, if it completes, the handler.
    ///
    /// `captures` are stored on the context first, so middleware and handler
    /// see the matches of this listener's constraint.
    pub async fn run(&self, request: Arc<Request>, captures: Captures) -> PylonResult<ChainOutcome> {
        request.context().set_matches(captures);

        let handler = Arc::clone(&self.inner.handler);
        let terminal: Terminal = Box::new(move |request: Arc<Request>| handler.call(request));

        trace!(
            listener = self.name().unwrap_or("unnamed"),
            middleware_count = self.inner.middleware.len(),
            "running listener"
        );
        run_chain(Arc::clone(&self.inner.middleware), request, Some(terminal)).await
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.inner.name)
            .field("constraint", &self.inner.constraint)
            .field("middleware_count", &self.inner.middleware.len())
            .finish_non_exhaustive()
    }
}

/// The response of a [`Listener`] used as a tower service.
#[derive(Debug)]
pub struct ListenerResponse {
    /// Whether the constraint matched.
    pub matched: bool,
    /// The result of running the chain, if it matched.
    pub outcome: Option<PylonResult<ChainOutcome>>,
}

impl Service<Arc<Request>> for Listener {
    type Response = ListenerResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Arc<Request>) -> Self::Future {
        let listener = self.clone();

        Box::pin(async move {
            let Some(captures) = listener.test(request.envelope()) else {
                return Ok(ListenerResponse {
                    matched: false,
                    outcome: None,
                });
            };
            let outcome = listener.run(request, captures).await;
            Ok(ListenerResponse {
                matched: true,
                outcome: Some(outcome),
            })
        })
    }
}

// ============================================================================
// ListenerBuilder
// ============================================================================

/// Collects listener-scoped middleware until a handler is attached.
pub struct ListenerBuilder {
    name: Option<String>,
    constraint: Constraint,
    middleware: Vec<BoxedMiddleware>,
}

impl ListenerBuilder {
    pub fn new(constraint: impl Into<Constraint>) -> Self {
        Self {
            name: None,
            constraint: constraint.into(),
            middleware: Vec::new(),
        }
    }

    /// Sets a name for this listener (useful for debugging).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a listener-scoped middleware.
    ///
    /// Listener middleware runs after all global middleware, in the order it
    /// was added.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends a pre-built boxed middleware.
    pub fn middleware_boxed(mut self, middleware: BoxedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Lets a message listener match messages with any subtype.
    ///
    /// Has no effect on other categories.
    pub fn allow_subtypes(self) -> Self {
        self.with_subtypes(SubtypeFilter::Any)
    }

    /// Restricts a message listener to one message subtype.
    ///
    /// Has no effect on other categories.
    pub fn subtype(self, subtype: impl Into<String>) -> Self {
        self.with_subtypes(SubtypeFilter::Only(subtype.into()))
    }

    fn with_subtypes(mut self, filter: SubtypeFilter) -> Self {
        match &mut self.constraint {
            Constraint::Message(message) => message.subtypes = filter,
            other => debug!(
                category = %other.category(),
                "subtype filters only apply to message listeners"
            ),
        }
        self
    }

    /// Attaches the handler and finishes the listener.
    pub fn handler<F, T>(self, f: F) -> Listener
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.handler_boxed(into_handler(f))
    }

    /// Attaches a pre-built boxed handler and finishes the listener.
    pub fn handler_boxed(self, handler: BoxedHandler) -> Listener {
        Listener {
            inner: Arc::new(ListenerInner {
                name: self.name,
                constraint: self.constraint,
                middleware: self.middleware.into(),
                handler,
            }),
        }
    }
}

// ============================================================================
// Builder functions
// ============================================================================

/// Listens for Events API events of the given type.
pub fn on_event(event_type: impl Into<Matcher>) -> ListenerBuilder {
    ListenerBuilder::new(EventConstraint {
        event_type: event_type.into(),
    })
}

/// Listens for plain messages whose text matches `pattern`.
///
/// Strings match as case-insensitive substrings. Regexes are also
/// case-insensitive unless they start with `(?-i)`; their captures are
/// available through
/// [`Context::matches`](pylon_core::Context::matches).
pub fn on_message(pattern: impl Into<MessagePattern>) -> ListenerBuilder {
    ListenerBuilder::new(MessageConstraint {
        pattern: Some(pattern.into()),
        subtypes: SubtypeFilter::PlainOnly,
    })
}

/// Listens for every plain message.
pub fn on_any_message() -> ListenerBuilder {
    ListenerBuilder::new(MessageConstraint::default())
}

/// Listens for a slash command, e.g. `/deploy`.
pub fn on_command(command: impl Into<Matcher>) -> ListenerBuilder {
    ListenerBuilder::new(CommandConstraint {
        command: command.into(),
    })
}

/// Listens for interactive actions. A plain string matches the `action_id`.
pub fn on_action(constraint: impl Into<ActionConstraint>) -> ListenerBuilder {
    ListenerBuilder::new(constraint.into())
}

/// Listens for shortcuts. A plain string matches the `callback_id`.
pub fn on_shortcut(constraint: impl Into<ShortcutConstraint>) -> ListenerBuilder {
    ListenerBuilder::new(constraint.into())
}

/// Listens for view submissions. A plain string matches the view's `callback_id`.
pub fn on_view(constraint: impl Into<ViewConstraint>) -> ListenerBuilder {
    ListenerBuilder::new(constraint.into())
}

/// Listens for options requests. A plain string matches the `action_id`.
pub fn on_options(constraint: impl Into<OptionsConstraint>) -> ListenerBuilder {
    ListenerBuilder::new(constraint.into())
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// A listener whose constraint matched, with the captures it produced.
#[derive(Debug, Clone)]
pub struct Matched {
    pub listener: Listener,
    pub captures: Captures,
}

/// The ordered collection of listeners owned by a dispatcher.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Vec<Listener>,
    by_category: HashMap<ListenerCategory, Vec<usize>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener.
    pub fn push(&mut self, listener: Listener) {
        let index = self.listeners.len();
        self.by_category
            .entry(listener.category())
            .or_default()
            .push(index);
        self.listeners.push(listener);
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Removes every listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
        self.by_category.clear();
    }

    /// Returns the listeners matching `envelope`, in registration order.
    pub fn matching(&self, envelope: &Envelope) -> Vec<Matched> {
        let categories = ListenerCategory::for_envelope(envelope);

        let mut candidates: Vec<usize> = categories
            .iter()
            .filter_map(|category| self.by_category.get(category))
            .flatten()
            .copied()
            .collect();
        if categories.len() > 1 {
            candidates.sort_unstable();
        }

        candidates
            .into_iter()
            .filter_map(|index| self.listeners.get(index))
            .filter_map(|listener| {
                let captures = listener.test(envelope);
                trace!(
                    listener = listener.name().unwrap_or("unnamed"),
                    category = %listener.category(),
                    matched = captures.is_some(),
                    "tested listener"
                );
                captures.map(|captures| Matched {
                    listener: listener.clone(),
                    captures,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pylon_core::{AckTracker, AuthorizeResult, AuthorizeSource, Context as RequestContext};
    use pylon_core::NoopClient;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn noop() {}

    fn message(text: &str) -> Envelope {
        Envelope::from_value(json!({
            "team_id": "T1",
            "event": { "type": "message", "text": text, "channel": "C1", "user": "U1" }
        }))
        .unwrap()
    }

    fn request(body: Value) -> Arc<Request> {
        let envelope = Arc::new(Envelope::from_value(body).unwrap());
        Arc::new(Request::new(
            Arc::clone(&envelope),
            RequestContext::new(
                AuthorizeSource::from_envelope(&envelope),
                AuthorizeResult::default(),
            ),
            AckTracker::detached().ack_fn(),
            Arc::new(NoopClient),
        ))
    }

    fn names(matched: &[Matched]) -> Vec<&str> {
        matched
            .iter()
            .map(|m| m.listener.name().unwrap_or_default())
            .collect()
    }

    #[test]
    fn event_and_message_listeners_interleave_in_registration_order() {
        let mut registry = ListenerRegistry::new();
        registry.push(on_message("hello").name("m1").handler(noop));
        registry.push(on_event("message").name("e1").handler(noop));
        registry.push(on_command("/hello").name("c1").handler(noop));
        registry.push(on_any_message().name("m2").handler(noop));
        registry.push(on_event("app_mention").name("e2").handler(noop));

        let matched = registry.matching(&message("hello there"));
        assert_eq!(names(&matched), ["m1", "e1", "m2"]);
    }

    #[test]
    fn subtype_opt_in_is_applied_by_the_builder() {
        let listener = on_message("hello").allow_subtypes().handler(noop);
        let Constraint::Message(constraint) = listener.constraint() else {
            panic!("expected a message constraint");
        };
        assert_eq!(constraint.subtypes, SubtypeFilter::Any);

        let ignored = on_command("/x").allow_subtypes().handler(noop);
        assert_eq!(ignored.category(), ListenerCategory::Command);
    }

    #[test]
    fn registry_clear_forgets_everything() {
        let mut registry = ListenerRegistry::new();
        registry.push(on_any_message().handler(noop));
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.matching(&message("hi")).is_empty());
    }

    #[tokio::test]
    async fn captures_reach_the_context() {
        let listener = on_message(regex::Regex::new(r"deploy (\w+)").unwrap()).handler(noop);
        let req = request(json!({
            "team_id": "T1",
            "event": { "type": "message", "text": "deploy prod", "channel": "C1" }
        }));

        let captures = listener.test(req.envelope()).unwrap();
        let outcome = listener.run(Arc::clone(&req), captures).await.unwrap();

        assert_eq!(outcome, ChainOutcome::Completed);
        assert_eq!(req.context().capture(1).as_deref(), Some("prod"));
    }

    #[tokio::test]
    async fn listener_works_as_a_tower_service() {
        let listener = on_command("/ping").handler(noop);

        let hit = listener
            .clone()
            .oneshot(request(json!({ "command": "/ping", "user_id": "U1" })))
            .await
            .unwrap();
        assert!(hit.matched);
        assert!(matches!(hit.outcome, Some(Ok(ChainOutcome::Completed))));

        let miss = listener
            .oneshot(request(json!({ "command": "/pong", "user_id": "U1" })))
            .await
            .unwrap();
        assert!(!miss.matched);
        assert!(miss.outcome.is_none());
    }
}
