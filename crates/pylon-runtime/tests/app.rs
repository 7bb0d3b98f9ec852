//! The transport boundary: `App::handle` with real acknowledgment tracking.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pylon_core::{
    Ack, AckResponse, AckState, AuthorizeResult, AuthorizeSource, BoxError, ErrorCode,
    UnhandledRequest,
};
use pylon_framework::Request;
use pylon_runtime::config::AppConfig;
use pylon_runtime::{App, Incoming, ProcessEventError, PylonConfig, RuntimeError};
use serde_json::{Value, json};
use tokio_test::assert_ok;

#[derive(Default)]
struct RecordingResponder {
    sent: Mutex<Vec<AckResponse>>,
}

#[async_trait]
impl pylon_core::Responder for RecordingResponder {
    async fn respond(&self, response: AckResponse) -> Result<(), BoxError> {
        self.sent.lock().push(response);
        Ok(())
    }
}

fn app(process_before_response: bool) -> App {
    App::from_config(PylonConfig {
        app: AppConfig {
            bot_token: Some("xoxb-test".into()),
            bot_user_id: Some("UBOT".into()),
            process_before_response,
            ..AppConfig::default()
        },
        ..PylonConfig::default()
    })
    .unwrap()
}

fn command(name: &str) -> Value {
    json!({
        "command": name,
        "text": "hello",
        "team_id": "T1",
        "user_id": "U1",
        "channel_id": "C1"
    })
}

async fn fail() -> Result<(), BoxError> {
    Err("boom".into())
}

#[tokio::test]
async fn stored_response_is_delivered_after_processing() {
    let mut app = app(true);
    app.command("/echo", |ack: Ack| async move { ack.ack_with("pong").await });

    let responder = Arc::new(RecordingResponder::default());
    let outcome = assert_ok!(app.handle(command("/echo"), responder.clone()).await);

    assert!(outcome.acknowledged);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.response, Some(AckResponse::Text("pong".into())));
    assert_eq!(*responder.sent.lock(), [AckResponse::Text("pong".into())]);
}

#[tokio::test]
async fn immediate_mode_responds_during_dispatch() {
    let mut app = app(false);
    app.command("/echo", |ack: Ack| async move { ack.ack().await });

    let responder = Arc::new(RecordingResponder::default());
    let outcome = assert_ok!(app.handle(command("/echo"), responder.clone()).await);

    assert!(outcome.acknowledged);
    assert_eq!(outcome.response, None);
    assert_eq!(*responder.sent.lock(), [AckResponse::Empty]);
}

#[tokio::test]
async fn events_are_acknowledged_without_a_listener_calling_ack() {
    let app = app(true);
    let responder = Arc::new(RecordingResponder::default());

    let body = json!({
        "team_id": "T1",
        "event": { "type": "app_home_opened", "user": "U1", "channel": "D1" }
    });
    let outcome = assert_ok!(app.handle(body, responder.clone()).await);

    assert!(outcome.acknowledged);
    assert_eq!(*responder.sent.lock(), [AckResponse::Empty]);
}

#[tokio::test]
async fn authorization_failure_counts_as_acknowledged() {
    let mut app = app(true);
    app.authorize(|_source: AuthorizeSource| async {
        Err::<AuthorizeResult, BoxError>("unknown installation".into())
    });

    let responder = Arc::new(RecordingResponder::default());
    let outcome = assert_ok!(app.handle(command("/echo"), responder.clone()).await);

    assert!(outcome.acknowledged);
    assert_eq!(outcome.error.map(|e| e.code()), Some(ErrorCode::Authorization));
    assert_eq!(outcome.tracker.state(), AckState::Abandoned);
    assert!(responder.sent.lock().is_empty());
}

#[tokio::test]
async fn listener_failure_without_ack_is_not_acknowledged() {
    let mut app = app(true);
    app.command("/echo", fail);

    let outcome = assert_ok!(
        app.handle(command("/echo"), Arc::new(RecordingResponder::default()))
            .await
    );

    assert!(!outcome.acknowledged);
    assert_eq!(outcome.error.map(|e| e.code()), Some(ErrorCode::Middleware));
    assert_eq!(outcome.tracker.state(), AckState::Pending);
}

#[tokio::test]
async fn listener_failure_after_ack_keeps_the_stored_response() {
    let mut app = app(true);
    app.command("/echo", |ack: Ack| async move {
        ack.ack_with(json!({ "text": "working" })).await?;
        Err::<(), BoxError>("downstream failed".into())
    });

    let responder = Arc::new(RecordingResponder::default());
    let outcome = assert_ok!(app.handle(command("/echo"), responder.clone()).await);

    assert!(outcome.acknowledged);
    assert_eq!(
        outcome.response,
        Some(AckResponse::Json(json!({ "text": "working" })))
    );
    assert!(outcome.error.is_some());
    assert_eq!(
        *responder.sent.lock(),
        [AckResponse::Json(json!({ "text": "working" }))]
    );
}

#[tokio::test]
async fn custom_process_event_error_handler_decides() {
    let mut app = app(true);
    app.command("/echo", fail)
        .process_event_error_handler(|failure: &ProcessEventError| {
            failure.error.code() == ErrorCode::Middleware
        });

    let outcome = assert_ok!(
        app.handle(command("/echo"), Arc::new(RecordingResponder::default()))
            .await
    );

    assert!(outcome.acknowledged);
    assert_eq!(outcome.tracker.state(), AckState::Abandoned);
    assert!(matches!(
        outcome.tracker.ack_fn().ack().await,
        Err(pylon_core::PylonError::AckAfterResponse)
    ));
}

#[tokio::test]
async fn unrecognized_body_is_rejected() {
    let app = app(true);
    let result = app
        .handle(json!({ "hello": "world" }), Arc::new(RecordingResponder::default()))
        .await;

    assert!(matches!(result, Err(RuntimeError::Envelope(_))));
}

#[tokio::test]
async fn retry_metadata_reaches_the_context() {
    let seen = Arc::new(Mutex::new(None));
    let mut app = app(true);
    let sink = seen.clone();
    app.event("app_mention", move |req: Arc<Request>| {
        let sink = sink.clone();
        async move {
            let ctx = req.context();
            *sink.lock() = Some((ctx.retry_num(), ctx.retry_reason().map(str::to_owned)));
        }
    });

    let incoming = Incoming::new(json!({
        "team_id": "T1",
        "event": { "type": "app_mention", "user": "U1", "channel": "C1", "text": "<@UBOT> hi" }
    }))
    .retry(2, "http_timeout");

    assert_ok!(
        app.handle_incoming(incoming, Arc::new(RecordingResponder::default()))
            .await
    );
    assert_eq!(*seen.lock(), Some((Some(2), Some("http_timeout".to_string()))));
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_request_reports_after_timeout() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let mut app = app(true);
    app.command("/slow", || async {})
        .unhandled_request_handler(move |request: UnhandledRequest| {
            assert_eq!(request.waited, Duration::from_millis(3001));
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let outcome = assert_ok!(
        app.handle(command("/slow"), Arc::new(RecordingResponder::default()))
            .await
    );
    assert!(!outcome.acknowledged);

    tokio::time::advance(Duration::from_millis(3000)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_millis(2)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // firing does not change the state; a late ack still succeeds
    assert_ok!(outcome.tracker.ack_fn().ack().await);
}
