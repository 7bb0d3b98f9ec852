//! # Pylon Core
//!
//! Protocol-level building blocks shared by every Pylon crate: the inbound
//! envelope model, the per-request [`Context`], the acknowledgment tracker,
//! conversation storage, the outbound API seam and the error taxonomy.
//!
//! This crate knows nothing about listeners or middleware; routing lives in
//! `pylon-framework`.
//!
//! ## Modules
//!
//! - [`envelope`]: the closed [`Envelope`] union and its payload types
//! - [`context`]: [`Context`], [`AuthorizeSource`] and [`AuthorizeResult`]
//! - [`ack`]: [`AckTracker`], [`Ack`] and the [`Responder`] transport trait
//! - [`conversation`]: [`ConversationStore`] and the default [`MemoryStore`]
//! - [`client`]: [`ApiClient`], [`Say`] and [`Respond`]
//! - [`receiver`]: the normalized [`ReceiverEvent`]
//! - [`error`]: [`PylonError`] and friends

pub mod ack;
pub mod client;
pub mod context;
pub mod conversation;
pub mod envelope;
pub mod error;
pub mod receiver;

pub use ack::{
    Ack, AckOptions, AckResponse, AckState, AckTracker, DEFAULT_UNHANDLED_TIMEOUT, NoopResponder,
    Responder, UnhandledRequest, UnhandledRequestHandler, WarnUnhandled,
};
pub use client::{ApiClient, BoxedClient, NoopClient, OutgoingMessage, Respond, Say};
pub use context::{AuthorizeResult, AuthorizeSource, Context, RESERVED_KEYS};
pub use conversation::{ConversationState, ConversationStore, MemoryStore, conversation_key};
pub use envelope::{
    ActionItem, ActionKind, ActionPayload, Authorization, Envelope, EnvelopeCategory, EventBody,
    EventEnvelope, IdRef, OptionsKind, OptionsRequest, ResponseUrl, ShortcutKind,
    ShortcutPayload, SlashCommand, ViewKind, ViewPayload, ViewState,
};
pub use error::{
    ApiError, ApiResult, AuthorizationError, BoxError, EnvelopeError, ErrorCode, PylonError,
    PylonResult, StoreError,
};
pub use receiver::ReceiverEvent;
