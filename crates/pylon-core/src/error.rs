//! Unified error types for the Pylon core.
//!
//! Every failure that can surface while an envelope travels through the
//! dispatch pipeline is expressed as a [`PylonError`]. The variants map onto
//! the error kinds an application's error handler needs to tell apart:
//! authorization failures, acknowledgment misuse, listener failures and
//! conversation store failures.

use thiserror::Error;

/// A boxed, thread-safe error used wherever user code hands us an arbitrary
/// error value.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Authorization Errors
// =============================================================================

/// Reasons a request context could not be built.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// The envelope did not carry a team id and was not an enterprise install.
    #[error("could not determine the team id for an incoming request")]
    MissingTeamId,

    /// The configured authorize function failed.
    #[error("authorization failed: {source}")]
    Failed {
        /// The error returned by the authorize function.
        #[source]
        source: BoxError,
    },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by a conversation store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("conversation store backend error: {0}")]
    Backend(String),

    /// Conversation state could not be (de)serialized.
    #[error("failed to serialize conversation state: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Errors returned by an [`ApiClient`](crate::client::ApiClient).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No client was configured for this application.
    #[error("no API client is configured")]
    NotConfigured,

    /// The platform answered with `ok: false`.
    #[error("API call '{method}' failed: {error}")]
    Platform {
        /// The API method that was called.
        method: String,
        /// The error code reported by the platform.
        error: String,
    },

    /// The request never reached the platform.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// Envelope Errors
// =============================================================================

/// Errors raised while classifying a raw inbound body.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The body did not look like any known envelope category.
    #[error("unrecognized envelope body")]
    Unrecognized,

    /// The body was classified but did not have the expected shape.
    #[error("malformed {category} envelope: {source}")]
    Malformed {
        /// The category the body was classified as.
        category: &'static str,
        /// The underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// PylonError
// =============================================================================

/// Stable, machine-readable codes for [`PylonError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Authorization,
    MultipleAcknowledgment,
    AckAfterResponse,
    UnhandledRequest,
    Middleware,
    MultipleListeners,
    Store,
    Api,
    Envelope,
    Transport,
    InvalidCustomProperty,
    ContextMissing,
}

impl ErrorCode {
    /// Returns the code as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "pylon_authorization_error",
            Self::MultipleAcknowledgment => "pylon_multiple_ack_error",
            Self::AckAfterResponse => "pylon_ack_after_response_error",
            Self::UnhandledRequest => "pylon_unhandled_request_error",
            Self::Middleware => "pylon_middleware_error",
            Self::MultipleListeners => "pylon_multiple_listener_error",
            Self::Store => "pylon_store_error",
            Self::Api => "pylon_api_error",
            Self::Envelope => "pylon_envelope_error",
            Self::Transport => "pylon_transport_error",
            Self::InvalidCustomProperty => "pylon_invalid_custom_property_error",
            Self::ContextMissing => "pylon_context_missing_property_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while dispatching an envelope.
#[derive(Debug, Error)]
pub enum PylonError {
    /// The request context could not be built.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// `ack()` was called more than once for the same envelope.
    #[error("ack() was called multiple times for the same request")]
    MultipleAcknowledgment,

    /// `ack()` was called after the transport had already answered.
    #[error("ack() was called after the transport already responded to the request")]
    AckAfterResponse,

    /// Nothing acknowledged the request within the configured window.
    #[error("request was not acknowledged within {waited_ms} ms")]
    UnhandledRequest {
        /// How long the tracker waited, in milliseconds.
        waited_ms: u64,
    },

    /// A middleware or handler returned an error or panicked.
    #[error("listener middleware failed: {source}")]
    Middleware {
        /// The original cause.
        #[source]
        source: BoxError,
    },

    /// More than one listener failed for the same envelope.
    #[error("{} listeners failed while processing the request", .0.len())]
    MultipleListeners(Vec<PylonError>),

    /// The conversation store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The inbound body could not be classified.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The transport failed to deliver an acknowledgment.
    #[error("transport failed to deliver the acknowledgment: {source}")]
    Transport {
        /// The error reported by the transport.
        #[source]
        source: BoxError,
    },

    /// A transport supplied a custom property that shadows a context field.
    #[error("custom property '{0}' collides with a reserved context field")]
    InvalidCustomProperty(String),

    /// A middleware needed a context field that was not populated.
    #[error("context is missing the '{0}' property")]
    ContextMissing(&'static str),
}

impl PylonError {
    /// Wraps an arbitrary error raised by user code.
    ///
    /// A `PylonError` that was boxed on the way out of a handler is unwrapped
    /// again instead of being nested.
    pub fn middleware(error: impl Into<BoxError>) -> Self {
        match error.into().downcast::<PylonError>() {
            Ok(inner) => *inner,
            Err(source) => Self::Middleware { source },
        }
    }

    /// Wraps a transport failure.
    pub fn transport(error: impl Into<BoxError>) -> Self {
        Self::Transport {
            source: error.into(),
        }
    }

    /// Returns the stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Authorization(_) => ErrorCode::Authorization,
            Self::MultipleAcknowledgment => ErrorCode::MultipleAcknowledgment,
            Self::AckAfterResponse => ErrorCode::AckAfterResponse,
            Self::UnhandledRequest { .. } => ErrorCode::UnhandledRequest,
            Self::Middleware { .. } => ErrorCode::Middleware,
            Self::MultipleListeners(_) => ErrorCode::MultipleListeners,
            Self::Store(_) => ErrorCode::Store,
            Self::Api(_) => ErrorCode::Api,
            Self::Envelope(_) => ErrorCode::Envelope,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::InvalidCustomProperty(_) => ErrorCode::InvalidCustomProperty,
            Self::ContextMissing(_) => ErrorCode::ContextMissing,
        }
    }

    /// Returns `true` for authorization failures.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }
}

/// Result type for dispatch operations.
pub type PylonResult<T> = Result<T, PylonError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
