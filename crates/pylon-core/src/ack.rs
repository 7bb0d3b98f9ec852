//! Acknowledgment tracking.
//!
//! Every inbound request must be acknowledged exactly once, and quickly: the
//! platform gives up on a request after roughly three seconds. The
//! [`AckTracker`] wraps the transport's [`Responder`] so that the dispatcher
//! and handlers share one enforced-once acknowledgment, and warns when a
//! request is never acknowledged.
//!
//! # State machine
//!
//! ```text
//!            ack()                      ack()
//! Pending ───────────▶ Acknowledged ──────────▶ Err(MultipleAcknowledgment)
//!    │
//!    │ abandon()                                ack()
//!    └───────────────▶ Abandoned ─────────────▶ Err(AckAfterResponse)
//! ```
//!
//! A timer started together with the tracker fires the
//! [`UnhandledRequestHandler`] if the request is still pending once the
//! configured window elapses. Firing the timer does not change the state: a
//! late `ack()` is still accepted unless the transport has abandoned the
//! request in the meantime.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, PylonError, PylonResult};

/// Default time to wait for an acknowledgment before warning.
pub const DEFAULT_UNHANDLED_TIMEOUT: Duration = Duration::from_millis(3001);

// ============================================================================
// AckResponse
// ============================================================================

/// The body sent back to the platform when a request is acknowledged.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AckResponse {
    /// An empty `200 OK`.
    #[default]
    Empty,
    /// A plain-text body.
    Text(String),
    /// A JSON body, e.g. view validation errors or an options list.
    Json(Value),
}

impl AckResponse {
    /// Returns `true` for [`AckResponse::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Renders the response as an HTTP body.
    pub fn to_body(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for AckResponse {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for AckResponse {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for AckResponse {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

// ============================================================================
// Responder
// ============================================================================

/// The transport side of an acknowledgment.
///
/// Transports implement this to write the acknowledgment back to the
/// platform (an HTTP response, a socket-mode frame, ...).
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    /// Delivers the acknowledgment.
    async fn respond(&self, response: AckResponse) -> Result<(), BoxError>;
}

/// A responder that drops every acknowledgment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResponder;

#[async_trait]
impl Responder for NoopResponder {
    async fn respond(&self, _response: AckResponse) -> Result<(), BoxError> {
        Ok(())
    }
}

// ============================================================================
// Unhandled Requests
// ============================================================================

/// Passed to the [`UnhandledRequestHandler`] when the timer fires.
#[derive(Clone)]
pub struct UnhandledRequest {
    /// How long the tracker waited.
    pub waited: Duration,
    /// The tracker of the request, so the transport can
    /// [`abandon`](AckTracker::abandon) it after answering on its own.
    pub tracker: AckTracker,
}

impl UnhandledRequest {
    /// Converts the notification into the matching error value.
    pub fn to_error(&self) -> PylonError {
        PylonError::UnhandledRequest {
            waited_ms: self.waited.as_millis() as u64,
        }
    }
}

/// Called when a request is still unacknowledged after the timeout.
pub trait UnhandledRequestHandler: Send + Sync + 'static {
    fn on_unhandled(&self, request: UnhandledRequest);
}

impl<F> UnhandledRequestHandler for F
where
    F: Fn(UnhandledRequest) + Send + Sync + 'static,
{
    fn on_unhandled(&self, request: UnhandledRequest) {
        self(request)
    }
}

/// Logs a warning; used when no handler is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarnUnhandled;

impl UnhandledRequestHandler for WarnUnhandled {
    fn on_unhandled(&self, request: UnhandledRequest) {
        warn!(
            waited_ms = request.waited.as_millis() as u64,
            code = %request.to_error().code(),
            "An incoming request was not acknowledged within {} ms. \
             Ensure that ack() is called in a listener.",
            request.waited.as_millis()
        );
    }
}

// ============================================================================
// AckOptions
// ============================================================================

/// Configuration for an [`AckTracker`].
#[derive(Clone)]
pub struct AckOptions {
    /// How long to wait before reporting an unacknowledged request.
    pub unhandled_timeout: Duration,
    /// Hold the acknowledgment body until processing completes instead of
    /// sending it straight away.
    pub process_before_response: bool,
    /// Called when the timeout elapses while still pending.
    pub unhandled_handler: Arc<dyn UnhandledRequestHandler>,
}

impl Default for AckOptions {
    fn default() -> Self {
        Self {
            unhandled_timeout: DEFAULT_UNHANDLED_TIMEOUT,
            process_before_response: false,
            unhandled_handler: Arc::new(WarnUnhandled),
        }
    }
}

impl std::fmt::Debug for AckOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckOptions")
            .field("unhandled_timeout", &self.unhandled_timeout)
            .field("process_before_response", &self.process_before_response)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AckTracker
// ============================================================================

/// The acknowledgment state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    /// Not acknowledged yet.
    Pending,
    /// Acknowledged by the app.
    Acknowledged,
    /// The transport answered on its own; acknowledging is no longer possible.
    Abandoned,
}

struct AckInner {
    state: Mutex<AckState>,
    stored: Mutex<Option<AckResponse>>,
    responder: Arc<dyn Responder>,
    process_before_response: bool,
    timer: CancellationToken,
}

impl Drop for AckInner {
    fn drop(&mut self) {
        self.timer.cancel();
    }
}

/// Enforces at-most-once acknowledgment for one request.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct AckTracker {
    inner: Arc<AckInner>,
}

impl AckTracker {
    /// Creates a tracker and starts the unhandled-request timer.
    ///
    /// The timer is only started when called from within a Tokio runtime.
    pub fn new(responder: impl Responder, options: AckOptions) -> Self {
        Self::from_arc(Arc::new(responder), options)
    }

    /// Creates a tracker from a shared responder.
    pub fn from_arc(responder: Arc<dyn Responder>, options: AckOptions) -> Self {
        let inner = Arc::new(AckInner {
            state: Mutex::new(AckState::Pending),
            stored: Mutex::new(None),
            responder,
            process_before_response: options.process_before_response,
            timer: CancellationToken::new(),
        });

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(watch_unacknowledged(
                    Arc::downgrade(&inner),
                    inner.timer.clone(),
                    options.unhandled_timeout,
                    options.unhandled_handler,
                ));
            }
            Err(_) => debug!("no Tokio runtime available, unhandled request timer disabled"),
        }

        Self { inner }
    }

    /// Creates a tracker without a transport or timer.
    ///
    /// Useful for tests and for replaying stored envelopes.
    pub fn detached() -> Self {
        let inner = Arc::new(AckInner {
            state: Mutex::new(AckState::Pending),
            stored: Mutex::new(None),
            responder: Arc::new(NoopResponder),
            process_before_response: true,
            timer: CancellationToken::new(),
        });
        Self { inner }
    }

    /// Returns the handle passed to listeners.
    pub fn ack_fn(&self) -> Ack {
        Ack {
            tracker: self.clone(),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> AckState {
        *self.inner.state.lock()
    }

    /// Returns `true` once the request has been acknowledged.
    pub fn is_acknowledged(&self) -> bool {
        self.state() == AckState::Acknowledged
    }

    /// Marks the request as answered by the transport.
    ///
    /// Returns `false` if the request had already left the pending state.
    pub fn abandon(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state != AckState::Pending {
            return false;
        }
        *state = AckState::Abandoned;
        self.inner.timer.cancel();
        true
    }

    /// Returns a copy of the stored acknowledgment body.
    pub fn stored_response(&self) -> Option<AckResponse> {
        self.inner.stored.lock().clone()
    }

    /// Removes and returns the stored acknowledgment body.
    pub fn take_stored_response(&self) -> Option<AckResponse> {
        self.inner.stored.lock().take()
    }

    async fn acknowledge(&self, response: AckResponse) -> PylonResult<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                AckState::Acknowledged => return Err(PylonError::MultipleAcknowledgment),
                AckState::Abandoned => return Err(PylonError::AckAfterResponse),
                AckState::Pending => *state = AckState::Acknowledged,
            }
        }
        self.inner.timer.cancel();

        if self.inner.process_before_response {
            trace!("storing acknowledgment until processing completes");
            *self.inner.stored.lock() = Some(response);
            return Ok(());
        }

        self.inner
            .responder
            .respond(response)
            .await
            .map_err(PylonError::transport)
    }
}

impl std::fmt::Debug for AckTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckTracker")
            .field("state", &self.state())
            .field("process_before_response", &self.inner.process_before_response)
            .finish()
    }
}

async fn watch_unacknowledged(
    inner: Weak<AckInner>,
    cancelled: CancellationToken,
    timeout: Duration,
    handler: Arc<dyn UnhandledRequestHandler>,
) {
    tokio::select! {
        _ = cancelled.cancelled() => {}
        _ = tokio::time::sleep(timeout) => {
            let Some(inner) = inner.upgrade() else { return };
            let tracker = AckTracker { inner };
            if tracker.state() == AckState::Pending {
                handler.on_unhandled(UnhandledRequest { waited: timeout, tracker });
            }
        }
    }
}

// ============================================================================
// Ack
// ============================================================================

/// The acknowledgment function handed to middleware and listeners.
#[derive(Clone, Debug)]
pub struct Ack {
    tracker: AckTracker,
}

impl Ack {
    /// Acknowledges with an empty body.
    pub async fn ack(&self) -> PylonResult<()> {
        self.tracker.acknowledge(AckResponse::Empty).await
    }

    /// Acknowledges with a body (text or JSON).
    pub async fn ack_with(&self, response: impl Into<AckResponse>) -> PylonResult<()> {
        self.tracker.acknowledge(response.into()).await
    }

    /// Returns `true` once the request has been acknowledged.
    pub fn is_acknowledged(&self) -> bool {
        self.tracker.is_acknowledged()
    }

    /// Returns a copy of the body stored in process-before-response mode.
    pub fn stored_response(&self) -> Option<AckResponse> {
        self.tracker.stored_response()
    }

    /// Returns the underlying tracker.
    pub fn tracker(&self) -> &AckTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        responses: Mutex<Vec<AckResponse>>,
    }

    #[async_trait]
    impl Responder for Arc<Recorder> {
        async fn respond(&self, response: AckResponse) -> Result<(), BoxError> {
            self.responses.lock().push(response);
            Ok(())
        }
    }

    fn counting_handler() -> (Arc<AtomicUsize>, AckOptions) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let options = AckOptions {
            unhandled_handler: Arc::new(move |_req: UnhandledRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            ..AckOptions::default()
        };
        (fired, options)
    }

    #[tokio::test]
    async fn second_ack_is_rejected() {
        let recorder = Arc::new(Recorder::default());
        let tracker = AckTracker::new(Arc::clone(&recorder), AckOptions::default());
        let ack = tracker.ack_fn();

        tokio_test::assert_ok!(ack.ack_with("done").await);
        let err = ack.ack().await.unwrap_err();

        assert!(matches!(err, PylonError::MultipleAcknowledgment));
        assert_eq!(recorder.responses.lock().as_slice(), &[AckResponse::from("done")]);
    }

    #[tokio::test]
    async fn second_ack_is_rejected_after_empty_ack() {
        let tracker = AckTracker::new(NoopResponder, AckOptions::default());
        let ack = tracker.ack_fn();

        ack.ack().await.unwrap();
        assert!(matches!(
            ack.ack_with(json!({ "ok": true })).await,
            Err(PylonError::MultipleAcknowledgment)
        ));
    }

    #[tokio::test]
    async fn process_before_response_stores_body() {
        let recorder = Arc::new(Recorder::default());
        let options = AckOptions {
            process_before_response: true,
            ..AckOptions::default()
        };
        let tracker = AckTracker::new(Arc::clone(&recorder), options);

        tracker
            .ack_fn()
            .ack_with(json!({ "response_action": "clear" }))
            .await
            .unwrap();

        assert!(recorder.responses.lock().is_empty());
        assert_eq!(
            tracker.take_stored_response(),
            Some(AckResponse::Json(json!({ "response_action": "clear" })))
        );
        assert_eq!(tracker.take_stored_response(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_when_pending() {
        let (fired, options) = counting_handler();
        let tracker = AckTracker::new(NoopResponder, options);

        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Firing does not change state, so a late ack still succeeds.
        assert_eq!(tracker.state(), AckState::Pending);
        tracker.ack_fn().ack().await.unwrap();
        assert!(tracker.is_acknowledged());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_is_cancelled_by_ack() {
        let (fired, options) = counting_handler();
        let tracker = AckTracker::new(NoopResponder, options);

        tracker.ack_fn().ack().await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ack_after_abandon_is_an_error() {
        let tracker = AckTracker::new(NoopResponder, AckOptions::default());

        assert!(tracker.abandon());
        assert!(!tracker.abandon());
        assert!(matches!(
            tracker.ack_fn().ack().await,
            Err(PylonError::AckAfterResponse)
        ));
    }

    #[test]
    fn detached_tracker_works_without_runtime() {
        let tracker = AckTracker::detached();
        tokio_test::block_on(tracker.ack_fn().ack_with("ok")).unwrap();
        assert_eq!(tracker.stored_response(), Some(AckResponse::Text("ok".into())));
    }
}
