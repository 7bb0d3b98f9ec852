//! Listener handlers.
//!
//! Handlers are ordinary async functions whose parameters implement
//! [`FromRequest`]. The [`Handler`] trait is implemented for functions of up
//! to 16 parameters, similar to Axum's handler system.
//!
//! ```rust,ignore
//! use pylon_framework::extract::*;
//!
//! // No parameters
//! async fn ping() {}
//!
//! // Extract the command and acknowledge it
//! async fn deploy(command: SlashCommand, ack: Ack) -> PylonResult<()> {
//!     ack.ack_with(format!("deploying {}", command.text)).await
//! }
//! ```
//!
//! A handler may return `()` or any `Result<(), E>` where `E` converts into a
//! boxed error. If a parameter cannot be extracted, the handler is not called
//! and the listener fails with the extraction error.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use pylon_core::{BoxError, PylonError, PylonResult};
use tracing::debug;

use crate::extractor::FromRequest;
use crate::request::Request;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Handler Output
// ============================================================================

/// Return types a handler may have.
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> PylonResult<()>;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> PylonResult<()> {
        Ok(())
    }
}

impl<E> IntoHandlerResult for Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_handler_result(self) -> PylonResult<()> {
        self.map_err(PylonError::middleware)
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The terminal step of a listener.
///
/// Automatically implemented for async functions that take 0-16 parameters
/// implementing [`FromRequest`] and return an [`IntoHandlerResult`].
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// The type of future calling this handler returns.
    type Future: Future<Output = PylonResult<()>> + Send + 'static;

    /// Call the handler for the given request.
    fn call(self, request: Arc<Request>) -> Self::Future;
}

// ============================================================================
// Type Erasure
// ============================================================================

/// A wrapper that converts a function into a boxed handler.
pub struct HandlerFn<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> HandlerFn<F, T> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, T> Clone for HandlerFn<F, T> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _marker: PhantomData,
        }
    }
}

/// A type-erased handler that can be stored in a listener.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync>;

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    fn call(&self, request: Arc<Request>) -> BoxFuture<'static, PylonResult<()>>;
}

impl<F, T> ErasedHandler for HandlerFn<F, T>
where
    F: Handler<T> + Send + Sync,
    T: 'static,
{
    fn call(&self, request: Arc<Request>) -> BoxFuture<'static, PylonResult<()>> {
        let f = self.f.clone();
        Box::pin(f.call(request))
    }
}

/// Convert a handler function into a boxed handler.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T> + Send + Sync + 'static,
    T: 'static,
{
    Arc::new(HandlerFn::new(f))
}

// ============================================================================
// Handler implementations for functions (Axum-style)
// ============================================================================

impl<F, Fut, R> Handler<((), R)> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + 'static,
{
    type Future = BoxFuture<'static, PylonResult<()>>;

    fn call(self, _request: Arc<Request>) -> Self::Future {
        Box::pin(async move { (self)().await.into_handler_result() })
    }
}

/// Generates `Handler` implementations for functions with different arities.
macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, R, $($ty,)*> Handler<(($($ty,)*), R)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoHandlerResult + 'static,
            $( $ty: FromRequest + Send + 'static, )*
        {
            type Future = BoxFuture<'static, PylonResult<()>>;

            fn call(self, request: Arc<Request>) -> Self::Future {
                Box::pin(async move {
                    $(
                        let $ty = match $ty::from_request(&request) {
                            Ok(value) => value,
                            Err(e) => {
                                debug!(error = %e, "handler parameter unavailable");
                                return Err(PylonError::from(e));
                            }
                        };
                    )*

                    (self)($($ty,)*).await.into_handler_result()
                })
            }
        }
    };
}

impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15
);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15, T16
);

#[cfg(test)]
mod tests {
    use super::*;
    use pylon_core::{
        Ack, AckTracker, AuthorizeResult, AuthorizeSource, Context, Envelope, NoopClient,
        SlashCommand,
    };
    use serde_json::json;

    fn command_request() -> Arc<Request> {
        let envelope = Envelope::from_value(json!({
            "command": "/echo",
            "text": "hello",
            "user_id": "U1",
            "team_id": "T1"
        }))
        .unwrap();
        Arc::new(Request::new(
            Arc::new(envelope),
            Context::new(AuthorizeSource::default(), AuthorizeResult::default()),
            AckTracker::detached().ack_fn(),
            Arc::new(NoopClient),
        ))
    }

    async fn echo(command: SlashCommand, ack: Ack) -> PylonResult<()> {
        ack.ack_with(command.text).await
    }

    async fn failing() -> Result<(), std::io::Error> {
        Err(std::io::Error::other("disk full"))
    }

    async fn wants_view(_view: pylon_core::ViewPayload) {
        panic!("must not be called for a command");
    }

    async fn maybe_view(view: Option<pylon_core::ViewPayload>, ack: Ack) -> PylonResult<()> {
        assert!(view.is_none());
        ack.ack().await
    }

    #[tokio::test]
    async fn extracts_parameters() {
        let request = command_request();
        into_handler(echo).call(Arc::clone(&request)).await.unwrap();

        assert_eq!(
            request.ack().stored_response(),
            Some(pylon_core::AckResponse::Text("hello".into()))
        );
    }

    #[tokio::test]
    async fn errors_are_wrapped() {
        let err = into_handler(failing).call(command_request()).await.unwrap_err();
        assert!(matches!(err, PylonError::Middleware { .. }));
        assert!(err.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn failed_extraction_fails_the_listener() {
        let err = into_handler(wants_view)
            .call(command_request())
            .await
            .unwrap_err();

        assert!(matches!(err, PylonError::Middleware { .. }));
        assert!(err.to_string().contains("expected 'view'"));
    }

    #[tokio::test]
    async fn optional_parameters_do_not_fail() {
        let request = command_request();
        tokio_test::assert_ok!(into_handler(maybe_view).call(Arc::clone(&request)).await);
        assert!(request.ack().is_acknowledged());
    }
}
