//! Extractor system for handler parameters.
//!
//! This module provides the [`FromRequest`] trait, which defines how types
//! can be extracted from a [`Request`] for use as handler parameters.

use std::sync::Arc;

use pylon_core::{
    Ack, ActionPayload, BoxedClient, ConversationState, Envelope, EnvelopeCategory, EventBody,
    EventEnvelope, OptionsRequest, Respond, Say, ShortcutPayload, SlashCommand, ViewPayload,
};

use crate::error::ExtractError;
use crate::request::Request;

/// A trait for types that can be extracted from a [`Request`].
///
/// If extraction fails, the handler is not called and the listener fails
/// with the [`ExtractError`].
///
/// # Example
///
/// ```rust,ignore
/// struct TeamId(String);
///
/// impl FromRequest for TeamId {
///     fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
///         req.context()
///             .team_id()
///             .map(|id| TeamId(id.to_string()))
///             .ok_or(ExtractError::Missing("team_id"))
///     }
/// }
/// ```
pub trait FromRequest: Sized {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError>;
}

impl FromRequest for Arc<Request> {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        Ok(Arc::clone(req))
    }
}

impl FromRequest for Arc<Envelope> {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        Ok(req.envelope_arc())
    }
}

/// Optional parameters never fail extraction.
impl<T: FromRequest> FromRequest for Option<T> {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        Ok(T::from_request(req).ok())
    }
}

impl FromRequest for Ack {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        Ok(req.ack().clone())
    }
}

impl FromRequest for BoxedClient {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        Ok(Arc::clone(req.client()))
    }
}

impl FromRequest for Say {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        req.say_fn().cloned().ok_or(ExtractError::Missing("say"))
    }
}

impl FromRequest for Respond {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        req.respond_fn()
            .cloned()
            .ok_or(ExtractError::Missing("respond"))
    }
}

impl FromRequest for ConversationState {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        req.context()
            .conversation()
            .ok_or(ExtractError::Missing("conversation"))
    }
}

/// The capture groups of the pattern that matched the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matches(pub Vec<Option<String>>);

impl Matches {
    /// Returns a capture group by index; index 0 is the whole match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index)?.as_deref()
    }
}

impl FromRequest for Matches {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        Ok(Matches(req.context().matches()))
    }
}

/// A value previously stored with [`Context::set_state`](pylon_core::Context::set_state).
#[derive(Debug, Clone)]
pub struct State<T>(pub T);

impl<T: Clone + 'static> FromRequest for State<T> {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        req.context()
            .get_state::<T>()
            .map(State)
            .ok_or(ExtractError::Missing(std::any::type_name::<T>()))
    }
}

// ============================================================================
// Payload extractors
// ============================================================================

fn mismatch(expected: EnvelopeCategory, got: &Envelope) -> ExtractError {
    ExtractError::CategoryMismatch {
        expected: expected.as_str(),
        got: got.category().as_str(),
    }
}

/// Generates extractors that clone a payload out of its envelope variant.
macro_rules! impl_payload_extractor {
    ($ty:ty, $variant:ident) => {
        impl FromRequest for $ty {
            fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
                match req.envelope() {
                    Envelope::$variant(payload) => Ok(payload.clone()),
                    other => Err(mismatch(EnvelopeCategory::$variant, other)),
                }
            }
        }
    };
}

impl_payload_extractor!(EventEnvelope, Event);
impl_payload_extractor!(SlashCommand, Command);
impl_payload_extractor!(ActionPayload, Action);
impl_payload_extractor!(ShortcutPayload, Shortcut);
impl_payload_extractor!(ViewPayload, View);
impl_payload_extractor!(OptionsRequest, Options);

/// The inner event of an Events API envelope.
impl FromRequest for EventBody {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        req.envelope()
            .as_event()
            .map(|envelope| envelope.event.clone())
            .ok_or_else(|| mismatch(EnvelopeCategory::Event, req.envelope()))
    }
}

/// The text of a `message` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageText(pub String);

impl FromRequest for MessageText {
    fn from_request(req: &Arc<Request>) -> Result<Self, ExtractError> {
        req.envelope()
            .as_message()
            .and_then(|message| message.text.clone())
            .map(MessageText)
            .ok_or(ExtractError::Missing("message text"))
    }
}
