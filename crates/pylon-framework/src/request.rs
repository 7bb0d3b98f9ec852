//! The argument bundle shared by middleware and listeners.

use std::sync::Arc;

use pylon_core::{Ack, BoxedClient, Context, Envelope, OutgoingMessage, PylonError, PylonResult};
use pylon_core::{Respond, Say};
use serde_json::Value;

/// Everything a middleware or handler gets to see for one request.
///
/// One `Request` is created per dispatch and shared by `Arc` through the
/// global chain and every matching listener. The [`Context`] inside it is the
/// only mutable part.
pub struct Request {
    envelope: Arc<Envelope>,
    context: Context,
    ack: Ack,
    client: BoxedClient,
    say: Option<Say>,
    respond: Option<Respond>,
}

impl Request {
    /// Assembles a request.
    ///
    /// `say` is available when the envelope names a conversation, `respond`
    /// when it carries a response URL.
    pub fn new(envelope: Arc<Envelope>, context: Context, ack: Ack, client: BoxedClient) -> Self {
        let say = context.conversation_id().map(|channel| {
            Say::new(
                Arc::clone(&client),
                channel,
                context.bot_token().map(str::to_string),
            )
        });
        let respond = envelope
            .response_url()
            .map(|url| Respond::new(Arc::clone(&client), url));

        Self {
            envelope,
            context,
            ack,
            client,
            say,
            respond,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Returns a shared handle to the envelope.
    pub fn envelope_arc(&self) -> Arc<Envelope> {
        Arc::clone(&self.envelope)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn ack(&self) -> &Ack {
        &self.ack
    }

    pub fn client(&self) -> &BoxedClient {
        &self.client
    }

    /// Returns the `say` helper, if the request happened in a conversation.
    pub fn say_fn(&self) -> Option<&Say> {
        self.say.as_ref()
    }

    /// Returns the `respond` helper, if the request carries a response URL.
    pub fn respond_fn(&self) -> Option<&Respond> {
        self.respond.as_ref()
    }

    /// Posts a message to the request's conversation.
    pub async fn say(&self, message: impl Into<OutgoingMessage>) -> PylonResult<Value> {
        let say = self.say.as_ref().ok_or(PylonError::ContextMissing("say"))?;
        Ok(say.say(message).await?)
    }

    /// Posts a message to the request's response URL.
    pub async fn respond(&self, message: impl Into<OutgoingMessage>) -> PylonResult<()> {
        let respond = self
            .respond
            .as_ref()
            .ok_or(PylonError::ContextMissing("respond"))?;
        Ok(respond.respond(message).await?)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("category", &self.envelope.category())
            .field("context", &self.context)
            .field("acknowledged", &self.ack.is_acknowledged())
            .finish_non_exhaustive()
    }
}
