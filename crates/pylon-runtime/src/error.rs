//! Runtime error types.

use pylon_core::{EnvelopeError, PylonError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The inbound body could not be classified.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Dispatching the request failed.
    #[error(transparent)]
    Dispatch(#[from] PylonError),

    /// The API client could not be created.
    #[error("Failed to build API client: {0}")]
    Client(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
