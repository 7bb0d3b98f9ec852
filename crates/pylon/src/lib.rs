//! # Pylon
//!
//! A type-safe SDK for building chat platform applications in Rust.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────────┐   ┌────────────────┐   ┌──────────────────────────┐
//! │ Transport │──▶│ Context Builder │──▶│ Global chain   │──▶│ Listener "/deploy"       │
//! │ (App)     │   │ (authorize)     │   │ (middleware)   │──▶│ Listener "hello"  ...    │
//! └───────────┘   └─────────────────┘   └────────────────┘   └──────────────────────────┘
//!       ▲                                                                 │
//!       └──────────────────────── ack() (exactly once) ◀──────────────────┘
//! ```
//!
//! - **App**: configuration, logging and the request boundary for transports
//! - **Dispatcher**: builds the context, runs middleware, matches listeners
//! - **Listeners**: a constraint, optional middleware and an Axum-style handler
//! - **Ack tracker**: enforces acknowledging each request at most once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pylon::prelude::*;
//!
//! async fn deploy(ack: Ack, respond: Respond, command: SlashCommand) -> PylonResult<()> {
//!     ack.ack().await?;
//!     respond.respond(format!("Deploying {}", command.text)).await?;
//!     Ok(())
//! }
//!
//! let mut app = App::builder().build()?;
//! app.command("/deploy", deploy)
//!     .add(on_message("hello").middleware(direct_mention).handler(say_hello));
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `pylon.toml` (default)
//! - `yaml-config`: load `pylon.yaml`
//! - `json-log`: JSON log output
//! - `http-client`: the `reqwest`-based Web API client

pub use pylon_core as core;
pub use pylon_framework as framework;
pub use pylon_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use pylon::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use pylon_runtime::{App, HandleOutcome, Incoming};

    // Listener registration
    pub use pylon_framework::{
        ActionConstraint, Dispatcher, Matcher, Next, Request, ShortcutConstraint,
        ViewConstraint, on_action, on_any_message, on_command, on_event, on_message, on_options,
        on_shortcut, on_view,
    };

    // Built-in middleware
    pub use pylon_framework::builtin::{conversation_step, direct_mention, ignore_self, subtype};

    // Extractors - for handler parameters
    pub use pylon_framework::extract::*;

    // Core types
    pub use pylon_core::{AckResponse, AuthorizeResult, BoxError, PylonError};
}
