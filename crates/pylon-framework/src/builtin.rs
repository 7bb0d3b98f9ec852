//! Built-in middleware.
//!
//! Each item here is an ordinary [`Middleware`] and can be registered
//! globally or on a single listener.

use std::sync::{Arc, LazyLock};

use pylon_core::{Envelope, PylonError, PylonResult};
use regex::Regex;
use tracing::trace;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Event types delivered about the app itself that should still reach listeners.
const SELF_EVENTS_TO_KEEP: &[&str] = &["member_joined_channel", "member_left_channel"];

/// `<@U123>` or `<@U123|name>` at the start of a message.
static LEADING_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@([^>|\s]+)[>|]").expect("mention pattern is valid"));

/// Drops events caused by the app's own bot user.
///
/// Compares the event's `bot_id` with the authorized bot id, and the event's
/// user with the bot user id. Membership events about the bot itself are
/// kept. Non-event envelopes always pass.
pub async fn ignore_self(req: Arc<Request>, next: Next) -> PylonResult<()> {
    if let Some(envelope) = req.envelope().as_event() {
        let event = &envelope.event;
        let ctx = req.context();

        if ctx.bot_id().is_some() && event.bot_id.as_deref() == ctx.bot_id() {
            trace!(bot_id = ?event.bot_id, "ignoring event from own bot");
            return Ok(());
        }

        if ctx.bot_user_id().is_some()
            && event.user_id() == ctx.bot_user_id()
            && !SELF_EVENTS_TO_KEEP.contains(&event.event_type.as_str())
        {
            trace!(event_type = %event.event_type, "ignoring event from own bot user");
            return Ok(());
        }
    }

    next.run().await
}

/// Only continues for messages that start with a mention of the bot user.
///
/// Fails with [`PylonError::ContextMissing`] if the bot user id is unknown.
pub async fn direct_mention(req: Arc<Request>, next: Next) -> PylonResult<()> {
    let bot_user_id = req
        .context()
        .bot_user_id()
        .ok_or(PylonError::ContextMissing("bot_user_id"))?;

    let Some(text) = req.envelope().as_message().and_then(|m| m.text.as_deref()) else {
        return Ok(());
    };

    if leading_mention(text) != Some(bot_user_id) {
        return Ok(());
    }

    next.run().await
}

/// Returns the user id of a mention at the start of `text`.
fn leading_mention(text: &str) -> Option<&str> {
    LEADING_MENTION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str())
}

/// Only continues for message events with the given subtype.
pub fn subtype(name: impl Into<String>) -> Subtype {
    Subtype {
        name: name.into().into(),
    }
}

/// Middleware returned by [`subtype`].
#[derive(Debug, Clone)]
pub struct Subtype {
    name: Arc<str>,
}

impl Middleware for Subtype {
    fn call(&self, req: Arc<Request>, next: Next) -> BoxFuture<'static, PylonResult<()>> {
        let matches = match req.envelope() {
            Envelope::Event(e) => e.event.subtype.as_deref() == Some(&*self.name),
            _ => false,
        };
        if matches {
            next.run()
        } else {
            Box::pin(async { Ok(()) })
        }
    }
}

/// Only continues when the loaded conversation is waiting for step `name`.
pub fn conversation_step(name: impl Into<String>) -> ConversationStep {
    ConversationStep {
        name: name.into().into(),
    }
}

/// Middleware returned by [`conversation_step`].
#[derive(Debug, Clone)]
pub struct ConversationStep {
    name: Arc<str>,
}

impl Middleware for ConversationStep {
    fn call(&self, req: Arc<Request>, next: Next) -> BoxFuture<'static, PylonResult<()>> {
        let at_step = req
            .context()
            .conversation()
            .and_then(|state| state.next_step)
            .is_some_and(|step| *step == *self.name);
        if at_step {
            next.run()
        } else {
            trace!(step = %self.name, "conversation is not at this step");
            Box::pin(async { Ok(()) })
        }
    }
}
