//! # Pylon Framework
//!
//! Routing and control flow for Pylon applications.
//!
//! This layer provides:
//! - Middleware chains with explicit `next` continuations ([`Middleware`], [`Next`])
//! - Listener constraints and the registry that matches envelopes against them
//! - Axum-style handlers whose parameters are extracted from the [`Request`]
//! - Built-in middleware ([`builtin`])
//! - The [`Dispatcher`] tying context building, middleware and listeners together
//!
//! The dispatcher is transport-agnostic; `pylon-runtime` wires it to
//! configuration and an acknowledgment responder.

pub mod builtin;
pub mod constraint;
pub mod context_builder;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod listener;
pub mod middleware;
pub mod request;

pub use constraint::{
    ActionConstraint, Captures, CommandConstraint, Constraint, EventConstraint, ListenerCategory,
    Matcher, MessageConstraint, MessagePattern, OptionsConstraint, ShortcutConstraint,
    SubtypeFilter, ViewConstraint,
};
pub use context_builder::{Authorize, ContextBuilder, SingleTeamAuthorization};
pub use dispatcher::{Dispatcher, ErrorContext, ErrorHandler};
pub use error::{ExtractError, ExtractResult};
pub use extractor::{FromRequest, Matches, MessageText, State};
pub use handler::{
    BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerFn, IntoHandlerResult, into_handler,
};
pub use listener::{
    Listener, ListenerBuilder, ListenerRegistry, ListenerResponse, Matched, on_action,
    on_any_message, on_command, on_event, on_message, on_options, on_shortcut, on_view,
};
pub use middleware::{
    BoxedMiddleware, ChainOutcome, Middleware, Next, Terminal, into_middleware, run_chain,
};
pub use request::Request;

/// Everything a handler signature usually needs.
pub mod extract {
    pub use crate::extractor::{FromRequest, Matches, MessageText, State};
    pub use crate::request::Request;
    pub use pylon_core::{
        Ack, ActionPayload, BoxedClient, ConversationState, EventBody, EventEnvelope,
        OptionsRequest, PylonResult, Respond, Say, ShortcutPayload, SlashCommand, ViewPayload,
    };
}
