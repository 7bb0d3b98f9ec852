//! The normalized inbound event handed over by a transport.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ack::{Ack, AckTracker};
use crate::envelope::Envelope;

/// One inbound request as delivered by a transport.
#[derive(Debug, Clone)]
pub struct ReceiverEvent {
    /// The classified body.
    pub body: Arc<Envelope>,
    /// The acknowledgment function for this request.
    pub ack: Ack,
    /// How many times the platform has retried delivery.
    pub retry_num: Option<u32>,
    /// Why the platform retried delivery.
    pub retry_reason: Option<String>,
    /// Extra properties the transport wants on the context.
    pub custom_properties: Map<String, Value>,
}

impl ReceiverEvent {
    pub fn new(body: Envelope, ack: Ack) -> Self {
        Self {
            body: Arc::new(body),
            ack,
            retry_num: None,
            retry_reason: None,
            custom_properties: Map::new(),
        }
    }

    /// Creates an event whose acknowledgment goes nowhere.
    ///
    /// The acknowledgment body is kept and can be read back through
    /// [`Ack::stored_response`].
    pub fn detached(body: Envelope) -> Self {
        Self::new(body, AckTracker::detached().ack_fn())
    }

    pub fn with_retry(mut self, retry_num: u32, retry_reason: impl Into<String>) -> Self {
        self.retry_num = Some(retry_num);
        self.retry_reason = Some(retry_reason.into());
        self
    }

    pub fn with_custom_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_properties.insert(key.into(), value);
        self
    }
}
