//! Pylon Runtime - the application layer of the Pylon SDK.
//!
//! This crate provides:
//! - Configuration loading and validation ([`config`])
//! - Logging setup over `tracing-subscriber` ([`logging`])
//! - [`App`], which wires configuration into a
//!   [`Dispatcher`](pylon_framework::Dispatcher) and implements the request
//!   boundary transports call into ([`App::handle`])
//! - An HTTP Web API client (`http-client` feature)
//!
//! ```ignore
//! use std::sync::Arc;
//! use pylon_runtime::App;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut app = App::builder().build()?;
//!     app.command("/echo", echo);
//!
//!     let outcome = app.handle(body, Arc::new(my_responder)).await?;
//!     Ok(())
//! }
//! ```

pub mod app;
#[cfg(feature = "http-client")]
pub mod client;
pub mod config;
pub mod error;
pub mod logging;

pub use app::{
    App, AppBuilder, DefaultProcessEventErrorHandler, HandleOutcome, Incoming, ProcessEventError,
    ProcessEventErrorHandler,
};
#[cfg(feature = "http-client")]
pub use client::HttpApiClient;
pub use config::{ConfigError, ConfigLoader, ConfigResult, PylonConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-exported for apps and transports
pub use tracing;
pub use tracing_subscriber;

/// Logging macros, so handlers need no direct `tracing` dependency.
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
