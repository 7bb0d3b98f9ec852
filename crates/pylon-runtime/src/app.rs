//! The application: configuration wired to a [`Dispatcher`], plus the
//! request boundary transports call into.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pylon_runtime::App;
//!
//! // Loads pylon.toml / PYLON_* variables from the current directory
//! let mut app = App::builder().build()?;
//!
//! app.message("hello", say_hello)
//!     .command("/deploy", deploy);
//!
//! // In a transport, for every inbound request:
//! let outcome = app.handle(body, responder).await?;
//! ```

use std::sync::Arc;

use pylon_core::{
    AckOptions, AckResponse, AckState, AckTracker, BoxedClient, ConversationStore, Envelope,
    MemoryStore, PylonError, ReceiverEvent, Responder, UnhandledRequestHandler, WarnUnhandled,
};
use pylon_framework::{
    ActionConstraint, Authorize, Dispatcher, ErrorHandler, Handler, Listener, Matcher,
    MessagePattern, Middleware, OptionsConstraint, ShortcutConstraint, SingleTeamAuthorization,
    ViewConstraint, builtin,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{ConfigLoader, ConfigResult, PylonConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

// ============================================================================
// Process-Event Errors
// ============================================================================

/// An error that escaped the dispatcher, as seen by the transport boundary.
#[derive(Debug)]
pub struct ProcessEventError {
    pub error: PylonError,
    /// The body acknowledged before the failure, if any was stored.
    pub stored_response: Option<AckResponse>,
}

/// Decides how the transport answers a request whose processing failed.
///
/// Returning `true` means "treat the request as acknowledged": the transport
/// answers on its own and later `ack()` calls fail with
/// [`PylonError::AckAfterResponse`].
pub trait ProcessEventErrorHandler: Send + Sync + 'static {
    fn handle(&self, error: &ProcessEventError) -> bool;
}

impl<F> ProcessEventErrorHandler for F
where
    F: Fn(&ProcessEventError) -> bool + Send + Sync + 'static,
{
    fn handle(&self, error: &ProcessEventError) -> bool {
        self(error)
    }
}

/// Authorization failures are answered right away (the transport replies
/// 401); anything else counts as acknowledged only if a response was stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProcessEventErrorHandler;

impl ProcessEventErrorHandler for DefaultProcessEventErrorHandler {
    fn handle(&self, error: &ProcessEventError) -> bool {
        if error.error.is_authorization() {
            return true;
        }
        error.stored_response.is_some()
    }
}

// ============================================================================
// Request Boundary Types
// ============================================================================

/// A raw inbound request as a transport received it.
#[derive(Debug, Clone)]
pub struct Incoming {
    body: Value,
    retry_num: Option<u32>,
    retry_reason: Option<String>,
    custom_properties: Map<String, Value>,
}

impl Incoming {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            retry_num: None,
            retry_reason: None,
            custom_properties: Map::new(),
        }
    }

    /// Records the platform's retry headers.
    pub fn retry(mut self, retry_num: u32, retry_reason: impl Into<String>) -> Self {
        self.retry_num = Some(retry_num);
        self.retry_reason = Some(retry_reason.into());
        self
    }

    pub fn custom_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_properties.insert(key.into(), value);
        self
    }
}

/// What the transport should do once [`App::handle`] returns.
#[derive(Debug)]
pub struct HandleOutcome {
    /// Whether the request counts as acknowledged.
    pub acknowledged: bool,
    /// The body delivered to the responder after processing, in
    /// process-before-response mode.
    pub response: Option<AckResponse>,
    /// The error that escaped the dispatcher, if any.
    pub error: Option<PylonError>,
    /// The request's tracker. A transport still waiting for a late `ack()`
    /// keeps it; dropping it cancels the unhandled-request timer.
    pub tracker: AckTracker,
}

// ============================================================================
// App
// ============================================================================

/// A configured Pylon application.
pub struct App {
    config: PylonConfig,
    dispatcher: Dispatcher,
    unhandled_handler: Arc<dyn UnhandledRequestHandler>,
    process_event_error_handler: Arc<dyn ProcessEventErrorHandler>,
}

impl App {
    /// Creates an app from the default configuration sources.
    ///
    /// Falls back to built-in defaults if loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                PylonConfig::default()
            });

        match Self::from_config(config) {
            Ok(app) => app,
            Err(e) => {
                eprintln!("Warning: Invalid configuration ({e}), using defaults");
                Self::assemble(PylonConfig::default(), None)
            }
        }
    }

    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Creates an app from an already loaded configuration.
    ///
    /// Validates the configuration, initializes logging and wires the
    /// dispatcher: single-team authorization from `app.bot_token`, the
    /// `ignore_self` middleware, an in-memory conversation store and, with
    /// the `http-client` feature, the Web API client.
    pub fn from_config(config: PylonConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let client = Self::create_client(&config)?;
        let app = Self::assemble(config, client);

        info!(
            process_before_response = app.config.app.process_before_response,
            ignore_self = app.config.app.ignore_self,
            has_bot_token = app.config.app.bot_token.is_some(),
            "App initialized from configuration"
        );

        Ok(app)
    }

    fn assemble(config: PylonConfig, client: Option<BoxedClient>) -> Self {
        let mut dispatcher = Dispatcher::new();

        if let Some(result) = config.app.authorize_result() {
            dispatcher.authorize(SingleTeamAuthorization::new(result));
        }
        if config.app.conversation_store {
            dispatcher.conversation_store(Arc::new(MemoryStore::new()));
        }
        if config.app.ignore_self {
            dispatcher.use_middleware(builtin::ignore_self);
        }
        if let Some(client) = client {
            dispatcher.client(client);
        }

        Self {
            config,
            dispatcher,
            unhandled_handler: Arc::new(WarnUnhandled),
            process_event_error_handler: Arc::new(DefaultProcessEventErrorHandler),
        }
    }

    #[cfg(feature = "http-client")]
    fn create_client(config: &PylonConfig) -> RuntimeResult<Option<BoxedClient>> {
        let client =
            crate::client::HttpApiClient::new(&config.app.api_url, config.app.api_timeout())?;
        debug!(api_url = %client.api_url(), "Web API client configured");
        Ok(Some(Arc::new(client)))
    }

    #[cfg(not(feature = "http-client"))]
    fn create_client(_config: &PylonConfig) -> RuntimeResult<Option<BoxedClient>> {
        debug!("http-client feature disabled, API calls need an explicit client");
        Ok(None)
    }

    pub fn config(&self) -> &PylonConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // ─── Configuration ──────────────────────────────────────────────────────

    pub fn authorize(&mut self, authorize: impl Authorize) -> &mut Self {
        self.dispatcher.authorize(authorize);
        self
    }

    pub fn conversation_store(&mut self, store: Arc<dyn ConversationStore>) -> &mut Self {
        self.dispatcher.conversation_store(store);
        self
    }

    pub fn client(&mut self, client: BoxedClient) -> &mut Self {
        self.dispatcher.client(client);
        self
    }

    /// Sets the global error handler, replacing any previous one.
    pub fn error(&mut self, handler: impl ErrorHandler) -> &mut Self {
        self.dispatcher.error(handler);
        self
    }

    /// Called when a request is not acknowledged within
    /// `app.unhandled_request_timeout_ms`.
    pub fn unhandled_request_handler(&mut self, handler: impl UnhandledRequestHandler) -> &mut Self {
        self.unhandled_handler = Arc::new(handler);
        self
    }

    /// Decides whether a failed request counts as acknowledged.
    pub fn process_event_error_handler(
        &mut self,
        handler: impl ProcessEventErrorHandler,
    ) -> &mut Self {
        self.process_event_error_handler = Arc::new(handler);
        self
    }

    // ─── Registration ───────────────────────────────────────────────────────

    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.dispatcher.use_middleware(middleware);
        self
    }

    pub fn add(&mut self, listener: Listener) -> &mut Self {
        self.dispatcher.add(listener);
        self
    }

    pub fn event<F, T>(&mut self, event_type: impl Into<Matcher>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.dispatcher.event(event_type, handler);
        self
    }

    pub fn message<F, T>(&mut self, pattern: impl Into<MessagePattern>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.dispatcher.message(pattern, handler);
        self
    }

    pub fn command<F, T>(&mut self, command: impl Into<Matcher>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.dispatcher.command(command, handler);
        self
    }

    pub fn action<F, T>(&mut self, constraint: impl Into<ActionConstraint>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.dispatcher.action(constraint, handler);
        self
    }

    pub fn shortcut<F, T>(
        &mut self,
        constraint: impl Into<ShortcutConstraint>,
        handler: F,
    ) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.dispatcher.shortcut(constraint, handler);
        self
    }

    pub fn view<F, T>(&mut self, constraint: impl Into<ViewConstraint>, handler: F) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.dispatcher.view(constraint, handler);
        self
    }

    pub fn options<F, T>(
        &mut self,
        constraint: impl Into<OptionsConstraint>,
        handler: F,
    ) -> &mut Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        self.dispatcher.options(constraint, handler);
        self
    }

    // ─── Processing ─────────────────────────────────────────────────────────

    /// Dispatches an already normalized event.
    pub async fn process_event(&self, event: ReceiverEvent) -> RuntimeResult<()> {
        self.dispatcher.process_event(event).await?;
        Ok(())
    }

    fn ack_options(&self) -> AckOptions {
        AckOptions {
            unhandled_timeout: self.config.app.unhandled_request_timeout(),
            process_before_response: self.config.app.process_before_response,
            unhandled_handler: self.unhandled_handler.clone(),
        }
    }

    /// Handles one raw request body on behalf of a transport.
    pub async fn handle(
        &self,
        body: Value,
        responder: Arc<dyn Responder>,
    ) -> RuntimeResult<HandleOutcome> {
        self.handle_incoming(Incoming::new(body), responder).await
    }

    /// Handles one inbound request on behalf of a transport.
    ///
    /// Classifies the body, tracks its acknowledgment through `responder`
    /// and dispatches it. In process-before-response mode the stored
    /// acknowledgment is delivered once all listeners have finished, even if
    /// one of them failed afterwards. Errors
    /// that escape the dispatcher are returned in the outcome after the
    /// process-event error handler decided whether the request counts as
    /// acknowledged.
    pub async fn handle_incoming(
        &self,
        incoming: Incoming,
        responder: Arc<dyn Responder>,
    ) -> RuntimeResult<HandleOutcome> {
        let envelope = Envelope::from_value(incoming.body)?;
        let tracker = AckTracker::from_arc(responder.clone(), self.ack_options());

        let mut event = ReceiverEvent::new(envelope, tracker.ack_fn());
        event.retry_num = incoming.retry_num;
        event.retry_reason = incoming.retry_reason;
        event.custom_properties = incoming.custom_properties;

        match self.dispatcher.process_event(event).await {
            Ok(()) => {
                let response = tracker.take_stored_response();
                if let Some(response) = &response {
                    responder
                        .respond(response.clone())
                        .await
                        .map_err(PylonError::transport)?;
                }
                let acknowledged = tracker.is_acknowledged();
                if !acknowledged {
                    debug!("request finished without being acknowledged");
                }
                Ok(HandleOutcome {
                    acknowledged,
                    response,
                    error: None,
                    tracker,
                })
            }
            Err(error) => {
                let failure = ProcessEventError {
                    error,
                    stored_response: tracker.take_stored_response(),
                };
                let acknowledged = self.process_event_error_handler.handle(&failure);
                if acknowledged && tracker.state() == AckState::Pending {
                    tracker.abandon();
                }
                if let Some(response) = &failure.stored_response {
                    if let Err(e) = responder.respond(response.clone()).await {
                        warn!("failed to deliver the stored acknowledgment: {e}");
                    }
                }
                warn!(
                    code = %failure.error.code(),
                    acknowledged,
                    "An unhandled error occurred while processing the request"
                );
                Ok(HandleOutcome {
                    acknowledged,
                    response: failure.stored_response,
                    error: Some(failure.error),
                    tracker,
                })
            }
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AppBuilder
// ============================================================================

/// Builder for an [`App`] with custom configuration sources.
///
/// ```rust,ignore
/// let app = App::builder()
///     .config_file("config/pylon.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct AppBuilder {
    config_loader: ConfigLoader,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration programmatically, on top of files and environment.
    pub fn merge(mut self, config: PylonConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration without building the app.
    pub fn load(self) -> ConfigResult<PylonConfig> {
        self.config_loader.load()
    }

    pub fn build(self) -> RuntimeResult<App> {
        let config = self.config_loader.load().map_err(RuntimeError::from)?;
        App::from_config(config)
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
