//! End-to-end dispatch behaviour: ordering, acknowledgment, matching and
//! error reporting through a real `Dispatcher`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pylon_core::{
    Ack, AckResponse, AckState, AckTracker, AuthorizeResult, AuthorizeSource, BoxError,
    ConversationState, ConversationStore, Envelope, ErrorCode, MemoryStore, PylonError,
    PylonResult, ReceiverEvent, Say,
};
use pylon_framework::builtin::{conversation_step, ignore_self};
use pylon_framework::{
    Dispatcher, ErrorContext, Next, Request, SingleTeamAuthorization, on_action, on_any_message,
    on_command, on_event, on_message,
};
use serde_json::{Value, json};
use tokio::time::Instant;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn receive(body: Value) -> ReceiverEvent {
    ReceiverEvent::detached(Envelope::from_value(body).unwrap())
}

fn message(text: &str) -> ReceiverEvent {
    receive(json!({
        "team_id": "T1",
        "event": { "type": "message", "text": text, "channel": "C1", "user": "U1", "ts": "1.0" }
    }))
}

fn bot_message(text: &str) -> ReceiverEvent {
    receive(json!({
        "team_id": "T1",
        "event": {
            "type": "message",
            "subtype": "bot_message",
            "text": text,
            "channel": "C1",
            "bot_id": "B9"
        }
    }))
}

fn command(name: &str) -> ReceiverEvent {
    receive(json!({
        "command": name,
        "text": "",
        "team_id": "T1",
        "user_id": "U1",
        "channel_id": "C1"
    }))
}

/// A handler that records `name` and completes.
fn record(
    log: &Log,
    name: &'static str,
) -> impl FnOnce() -> std::future::Ready<()> + Clone + Send + Sync + use<> {
    let log = Arc::clone(log);
    move || {
        log.lock().push(name);
        std::future::ready(())
    }
}

/// A global middleware that records `name` and continues.
fn record_and_continue(
    log: &Log,
    name: &'static str,
) -> impl Fn(Arc<Request>, Next) -> pylon_framework::BoxFuture<'static, PylonResult<()>>
+ Send
+ Sync
+ use<> {
    let log = Arc::clone(log);
    move |_req: Arc<Request>, next: Next| {
        log.lock().push(name);
        next.run()
    }
}

fn counting_error_handler(
    count: &Arc<AtomicUsize>,
    seen: &Arc<Mutex<Vec<ErrorCode>>>,
) -> impl Fn(PylonError, ErrorContext) -> std::future::Ready<PylonResult<()>> + Send + Sync + use<>
{
    let count = Arc::clone(count);
    let seen = Arc::clone(seen);
    move |error: PylonError, _ctx: ErrorContext| {
        count.fetch_add(1, Ordering::SeqCst);
        seen.lock().push(error.code());
        std::future::ready(Ok(()))
    }
}

async fn stop(_req: Arc<Request>, _next: Next) -> PylonResult<()> {
    Ok(())
}

async fn explode() {
    panic!("handler exploded");
}

async fn slow(_req: Arc<Request>, next: Next) -> PylonResult<()> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    next.run().await
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn matching_listeners_run_one_after_another_in_registration_order() {
    let log = new_log();
    let slow_log = Arc::clone(&log);

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .add(
            on_message("hello")
                .middleware(slow)
                .handler(move || {
                    let log = Arc::clone(&slow_log);
                    async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        log.lock().push("first");
                    }
                }),
        )
        .add(on_any_message().handler(record(&log, "second")));

    dispatcher.process_event(message("hello world")).await.unwrap();

    assert_eq!(*log.lock(), ["first", "second"]);
}

#[tokio::test]
async fn global_middleware_runs_before_the_listener_in_order() {
    let log = new_log();

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .use_middleware(record_and_continue(&log, "m1"))
        .use_middleware(record_and_continue(&log, "m2"))
        .add(on_message("hello").handler(record(&log, "h")));

    dispatcher.process_event(message("hello")).await.unwrap();

    assert_eq!(*log.lock(), ["m1", "m2", "h"]);
}

#[tokio::test]
async fn middleware_without_next_stops_silently() {
    let log = new_log();
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .error(counting_error_handler(&count, &seen))
        .use_middleware(record_and_continue(&log, "m1"))
        .use_middleware(stop)
        .use_middleware(record_and_continue(&log, "m3"))
        .add(on_any_message().handler(record(&log, "h")));

    tokio_test::assert_ok!(dispatcher.process_event(message("hello")).await);

    assert_eq!(*log.lock(), ["m1"]);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn listener_middleware_without_next_skips_only_that_listener() {
    let log = new_log();

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .add(on_any_message().middleware(stop).handler(record(&log, "blocked")))
        .add(on_any_message().handler(record(&log, "open")));

    dispatcher.process_event(message("hi")).await.unwrap();

    assert_eq!(*log.lock(), ["open"]);
}

// ============================================================================
// Acknowledgment
// ============================================================================

#[tokio::test]
async fn second_ack_fails_with_or_without_a_body() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.command("/twice", |ack: Ack| async move {
        ack.ack_with("first").await?;
        ack.ack().await
    });
    dispatcher.command("/twice-empty", |ack: Ack| async move {
        ack.ack().await?;
        ack.ack_with(json!({ "text": "again" })).await
    });

    let err = dispatcher.process_event(command("/twice")).await.unwrap_err();
    assert!(matches!(err, PylonError::MultipleAcknowledgment));

    let err = dispatcher
        .process_event(command("/twice-empty"))
        .await
        .unwrap_err();
    assert!(matches!(err, PylonError::MultipleAcknowledgment));
}

#[tokio::test]
async fn stored_ack_response_reaches_the_transport() {
    let tracker = AckTracker::detached();
    let event = ReceiverEvent::new(
        Envelope::from_value(json!({
            "type": "block_actions",
            "team": { "id": "T1" },
            "user": { "id": "U1" },
            "actions": [
                { "action_id": "other", "block_id": "b0" },
                { "action_id": "approve", "block_id": "request" }
            ]
        }))
        .unwrap(),
        tracker.ack_fn(),
    );

    let mut dispatcher = Dispatcher::new();
    dispatcher.action("approve", |ack: Ack| async move { ack.ack_with("approved").await });

    dispatcher.process_event(event).await.unwrap();

    assert_eq!(tracker.state(), AckState::Acknowledged);
    assert_eq!(
        tracker.take_stored_response(),
        Some(AckResponse::Text("approved".into()))
    );
}

// ============================================================================
// Matching
// ============================================================================

#[tokio::test]
async fn bot_messages_only_reach_listeners_that_opt_in() {
    let plain = Arc::new(AtomicUsize::new(0));
    let any = Arc::new(AtomicUsize::new(0));
    let (plain_clone, any_clone) = (Arc::clone(&plain), Arc::clone(&any));

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .add(on_message("hello").handler(move || {
            plain_clone.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }))
        .add(on_message("hello").allow_subtypes().handler(move || {
            any_clone.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }));

    dispatcher.process_event(message("hello world")).await.unwrap();
    assert_eq!(plain.load(Ordering::SeqCst), 1);
    assert_eq!(any.load(Ordering::SeqCst), 1);

    dispatcher.process_event(bot_message("hello world")).await.unwrap();
    assert_eq!(plain.load(Ordering::SeqCst), 1);
    assert_eq!(any.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn event_listeners_do_not_see_commands() {
    let log = new_log();

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .add(on_event("message").handler(record(&log, "event")))
        .add(on_command("/deploy").handler(record(&log, "command")));

    dispatcher.process_event(command("/deploy")).await.unwrap();
    dispatcher.process_event(message("deploy")).await.unwrap();

    assert_eq!(*log.lock(), ["command", "event"]);
}

#[tokio::test]
async fn ignore_self_drops_the_apps_own_messages() {
    let log = new_log();

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .authorize(SingleTeamAuthorization::new(AuthorizeResult {
            bot_token: Some("xoxb-1".into()),
            bot_id: Some("B9".into()),
            bot_user_id: Some("UBOT".into()),
            ..AuthorizeResult::default()
        }))
        .use_middleware(ignore_self)
        .add(on_any_message().allow_subtypes().handler(record(&log, "h")));

    dispatcher.process_event(bot_message("from me")).await.unwrap();
    dispatcher.process_event(message("from a human")).await.unwrap();

    assert_eq!(*log.lock(), ["h"]);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn failing_handler_is_reported_once_and_other_listeners_still_run() {
    let log = new_log();
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .error(counting_error_handler(&count, &seen))
        .message("hello", || async { Err::<(), BoxError>("handler failed".into()) })
        .add(on_any_message().handler(record(&log, "second")));

    dispatcher.process_event(message("hello")).await.unwrap();

    assert_eq!(*log.lock(), ["second"]);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock(), [ErrorCode::Middleware]);
}

#[tokio::test]
async fn panicking_handler_is_reported_as_a_middleware_error() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.message("hello", explode);

    let err = dispatcher.process_event(message("hello")).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::Middleware);
    assert!(err.to_string().contains("handler exploded"));
}

#[tokio::test]
async fn missing_handler_parameter_is_reported() {
    let ran = Arc::new(AtomicUsize::new(0));
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let ran_clone = Arc::clone(&ran);

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .error(counting_error_handler(&count, &seen))
        .view("survey", move |ack: Ack, _say: Say| {
            let ran = Arc::clone(&ran_clone);
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                ack.ack().await
            }
        });

    // view submissions carry no channel, so there is nothing to `say` into
    dispatcher
        .process_event(receive(json!({
            "type": "view_submission",
            "team": { "id": "T1" },
            "user": { "id": "U1" },
            "view": { "id": "V1", "callback_id": "survey" }
        })))
        .await
        .unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock(), [ErrorCode::Middleware]);
}

#[tokio::test]
async fn several_failing_listeners_are_reported_together() {
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .message("hello", || async { Err::<(), BoxError>("one".into()) })
        .add(on_any_message().handler(|| async { Err::<(), BoxError>("two".into()) }));

    let err = dispatcher.process_event(message("hello")).await.unwrap_err();

    let PylonError::MultipleListeners(errors) = err else {
        panic!("expected MultipleListeners, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn authorization_failure_stops_the_whole_request() {
    let log = new_log();
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let request_present = Arc::new(Mutex::new(None));
    let request_clone = Arc::clone(&request_present);
    let handler = counting_error_handler(&count, &seen);

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .authorize(|_source: AuthorizeSource| async {
            Err::<AuthorizeResult, BoxError>("unknown installation".into())
        })
        .error(move |error: PylonError, ctx: ErrorContext| {
            *request_clone.lock() = Some(ctx.request.is_some());
            handler(error, ctx)
        })
        .use_middleware(record_and_continue(&log, "global"))
        .add(on_any_message().handler(record(&log, "listener")));

    dispatcher.process_event(message("hello")).await.unwrap();

    assert!(log.lock().is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock(), [ErrorCode::Authorization]);
    assert_eq!(*request_present.lock(), Some(false));
}

#[tokio::test]
async fn unhandled_errors_are_returned_to_the_caller() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.command("/fail", || async {
        Err::<(), PylonError>(PylonError::ContextMissing("respond"))
    });

    let err = dispatcher.process_event(command("/fail")).await.unwrap_err();
    assert!(matches!(err, PylonError::ContextMissing("respond")));
}

// ============================================================================
// Conversation state
// ============================================================================

#[tokio::test(start_paused = true)]
async fn conversation_state_survives_until_it_expires() {
    let store = Arc::new(MemoryStore::new());
    let log = new_log();
    let data = Arc::new(Mutex::new(None));
    let data_clone = Arc::clone(&data);

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .conversation_store(Arc::clone(&store) as Arc<dyn ConversationStore>)
        .add(
            on_any_message()
                .middleware(conversation_step("size"))
                .handler(move |state: ConversationState| {
                    *data_clone.lock() = Some(state.data);
                    std::future::ready(())
                }),
        )
        .add(
            on_message("order")
                .handler(|req: Arc<Request>| async move {
                    let state = ConversationState::new(json!({ "item": "coffee" }))
                        .with_next_step("size");
                    req.context()
                        .update_conversation(state, Some(Instant::now() + Duration::from_secs(60)))
                        .await
                }),
        )
        .add(on_message("large").handler(record(&log, "large")));

    dispatcher.process_event(message("order")).await.unwrap();
    dispatcher.process_event(message("large")).await.unwrap();
    assert_eq!(*data.lock(), Some(json!({ "item": "coffee" })));
    assert_eq!(*log.lock(), ["large"]);

    tokio::time::advance(Duration::from_secs(61)).await;

    assert_eq!(store.len(), 1);
    assert_eq!(store.get("T1:C1").await.unwrap(), None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn completing_a_conversation_deletes_it() {
    let store = Arc::new(MemoryStore::new());
    store
        .set("T1:C1", ConversationState::new(json!({ "n": 1 })), None)
        .await
        .unwrap();

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .conversation_store(Arc::clone(&store) as Arc<dyn ConversationStore>)
        .message("done", |req: Arc<Request>| async move {
            req.context().complete_conversation().await
        });

    dispatcher.process_event(message("done")).await.unwrap();

    assert!(store.is_empty());
}
