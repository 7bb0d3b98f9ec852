//! Middleware chain execution.
//!
//! A middleware receives the shared [`Request`] and a [`Next`] continuation.
//! It may inspect or mutate the context, then:
//!
//! - call `next.run().await` to hand over to the following middleware (or
//!   the terminal step once the chain is exhausted),
//! - return `Ok(())` without calling `next` to end the chain silently, or
//! - return `Err(..)` to abort the chain and report the error.
//!
//! `Next::run` consumes the continuation, so a middleware cannot continue
//! the chain twice.
//!
//! ```rust,ignore
//! use pylon_framework::{Next, Request};
//!
//! async fn log_request(req: Arc<Request>, next: Next) -> PylonResult<()> {
//!     tracing::info!(category = %req.envelope().category(), "incoming request");
//!     next.run().await
//! }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use pylon_core::{PylonError, PylonResult};
use tracing::trace;

use crate::handler::BoxFuture;
use crate::request::Request;

// ============================================================================
// Middleware Trait
// ============================================================================

/// A step in a middleware chain.
///
/// Implemented for every `Fn(Arc<Request>, Next) -> impl Future<Output =
/// PylonResult<()>>`, so plain async functions and closures work directly.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, request: Arc<Request>, next: Next) -> BoxFuture<'static, PylonResult<()>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Arc<Request>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PylonResult<()>> + Send + 'static,
{
    fn call(&self, request: Arc<Request>, next: Next) -> BoxFuture<'static, PylonResult<()>> {
        Box::pin(self(request, next))
    }
}

/// A type-erased middleware that can be stored in a chain.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Boxes a middleware.
pub fn into_middleware<M: Middleware>(middleware: M) -> BoxedMiddleware {
    Arc::new(middleware)
}

/// The step run once every middleware of a chain has called `next`.
pub type Terminal = Box<dyn FnOnce(Arc<Request>) -> BoxFuture<'static, PylonResult<()>> + Send>;

// ============================================================================
// Next
// ============================================================================

/// The continuation handed to each middleware.
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    index: usize,
    request: Arc<Request>,
    terminal: Option<Terminal>,
    reached: Arc<AtomicBool>,
}

impl Next {
    /// Runs the rest of the chain and waits for it to finish.
    ///
    /// Panics raised further down the chain are caught and returned as
    /// [`PylonError::Middleware`].
    pub fn run(mut self) -> BoxFuture<'static, PylonResult<()>> {
        Box::pin(async move {
            match self.chain.get(self.index).cloned() {
                Some(middleware) => {
                    trace!(index = self.index, "entering middleware");
                    self.index += 1;
                    let request = Arc::clone(&self.request);
                    guarded(middleware.call(request, self)).await
                }
                None => {
                    self.reached.store(true, Ordering::SeqCst);
                    match self.terminal.take() {
                        Some(terminal) => guarded(terminal(Arc::clone(&self.request))).await,
                        None => Ok(()),
                    }
                }
            }
        })
    }

    /// Returns the request travelling through the chain.
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

async fn guarded(future: BoxFuture<'static, PylonResult<()>>) -> PylonResult<()> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(PylonError::middleware(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => format!("panicked: {message}"),
        Err(payload) => match payload.downcast_ref::<&'static str>() {
            Some(message) => format!("panicked: {message}"),
            None => "panicked".to_string(),
        },
    }
}

// ============================================================================
// Running a Chain
// ============================================================================

/// How a chain run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every middleware called `next` and the terminal step ran.
    Completed,
    /// Some middleware returned without calling `next`.
    ShortCircuited,
}

/// Runs `chain` for `request`, followed by `terminal`.
///
/// Returns the first error raised by a middleware or the terminal step.
/// Errors are not caught along the way, so a middleware can observe (and
/// even swallow) errors raised after it by inspecting the result of
/// `next.run()`.
pub async fn run_chain(
    chain: Arc<[BoxedMiddleware]>,
    request: Arc<Request>,
    terminal: Option<Terminal>,
) -> PylonResult<ChainOutcome> {
    let reached = Arc::new(AtomicBool::new(false));
    let next = Next {
        chain,
        index: 0,
        request,
        terminal,
        reached: Arc::clone(&reached),
    };

    next.run().await?;

    if reached.load(Ordering::SeqCst) {
        Ok(ChainOutcome::Completed)
    } else {
        trace!("middleware chain short-circuited");
        Ok(ChainOutcome::ShortCircuited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pylon_core::{
        AckTracker, AuthorizeResult, AuthorizeSource, Context, Envelope, NoopClient,
    };
    use serde_json::json;

    fn request() -> Arc<Request> {
        let envelope = Envelope::from_value(json!({
            "team_id": "T1",
            "event": { "type": "app_mention", "text": "hi", "channel": "C1", "user": "U1" }
        }))
        .unwrap();
        let context = Context::new(AuthorizeSource::default(), AuthorizeResult::default());
        Arc::new(Request::new(
            Arc::new(envelope),
            context,
            AckTracker::detached().ack_fn(),
            Arc::new(NoopClient),
        ))
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> BoxedMiddleware {
        let log = Arc::clone(log);
        into_middleware(move |_req: Arc<Request>, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(name);
                next.run().await
            }
        })
    }

    fn terminal(log: &Arc<Mutex<Vec<&'static str>>>) -> Terminal {
        let log = Arc::clone(log);
        Box::new(move |_req: Arc<Request>| -> BoxFuture<'static, PylonResult<()>> {
            Box::pin(async move {
                log.lock().push("handler");
                Ok(())
            })
        })
    }

    async fn stop(_req: Arc<Request>, _next: Next) -> PylonResult<()> {
        Ok(())
    }

    async fn fail(_req: Arc<Request>, _next: Next) -> PylonResult<()> {
        Err(PylonError::ContextMissing("bot_user_id"))
    }

    async fn boom(_req: Arc<Request>, _next: Next) -> PylonResult<()> {
        panic!("exploded");
    }

    #[tokio::test]
    async fn runs_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Arc<[BoxedMiddleware]> = vec![recorder(&log, "m1"), recorder(&log, "m2")].into();

        let outcome = run_chain(chain, request(), Some(terminal(&log))).await.unwrap();

        assert_eq!(outcome, ChainOutcome::Completed);
        assert_eq!(*log.lock(), ["m1", "m2", "handler"]);
    }

    #[tokio::test]
    async fn missing_next_short_circuits_silently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Arc<[BoxedMiddleware]> = vec![
            recorder(&log, "m1"),
            into_middleware(stop),
            recorder(&log, "m3"),
        ]
        .into();

        let outcome = run_chain(chain, request(), Some(terminal(&log))).await.unwrap();

        assert_eq!(outcome, ChainOutcome::ShortCircuited);
        assert_eq!(*log.lock(), ["m1"]);
    }

    #[tokio::test]
    async fn errors_abort_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Arc<[BoxedMiddleware]> = vec![into_middleware(fail), recorder(&log, "m2")].into();

        let err = run_chain(chain, request(), Some(terminal(&log))).await.unwrap_err();

        assert!(matches!(err, PylonError::ContextMissing("bot_user_id")));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn panics_become_middleware_errors() {
        let chain: Arc<[BoxedMiddleware]> = vec![into_middleware(boom)].into();

        let err = run_chain(chain, request(), None).await.unwrap_err();

        assert!(matches!(err, PylonError::Middleware { .. }));
        assert!(err.to_string().contains("exploded"));
    }

    #[tokio::test]
    async fn outer_middleware_sees_inner_errors() {
        let seen = Arc::new(Mutex::new(None));
        let seen_outer = Arc::clone(&seen);
        let outer = into_middleware(move |_req: Arc<Request>, next: Next| {
            let seen = Arc::clone(&seen_outer);
            async move {
                let result = next.run().await;
                *seen.lock() = result.as_ref().err().map(|e| e.code());
                result
            }
        });
        let failing: Terminal = Box::new(|_req: Arc<Request>| -> BoxFuture<'static, PylonResult<()>> {
            Box::pin(async { Err(PylonError::MultipleAcknowledgment) })
        });
        let chain: Arc<[BoxedMiddleware]> = vec![outer].into();

        assert!(run_chain(chain, request(), Some(failing)).await.is_err());
        assert_eq!(
            *seen.lock(),
            Some(pylon_core::ErrorCode::MultipleAcknowledgment)
        );
    }

    #[tokio::test]
    async fn middleware_mutations_are_visible_downstream() {
        let write = into_middleware(|req: Arc<Request>, next: Next| async move {
            req.context().set_state(String::from("from m1"));
            next.run().await
        });
        let read = into_middleware(|req: Arc<Request>, next: Next| async move {
            assert_eq!(req.context().get_state::<String>().as_deref(), Some("from m1"));
            next.run().await
        });
        let chain: Arc<[BoxedMiddleware]> = vec![write, read].into();

        let outcome = run_chain(chain, request(), None).await.unwrap();
        assert_eq!(outcome, ChainOutcome::Completed);
    }
}
