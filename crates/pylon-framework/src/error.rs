//! Error types for the Pylon framework.

use pylon_core::PylonError;
use thiserror::Error;

/// Errors that can occur while extracting handler parameters.
///
/// A failed extraction fails the listener like any handler error. Wrap the
/// parameter in `Option` to make it optional.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The envelope is not of the category the parameter expects.
    #[error("envelope category mismatch: expected '{expected}', got '{got}'")]
    CategoryMismatch {
        /// The category the extractor needs.
        expected: &'static str,
        /// The category of the envelope.
        got: &'static str,
    },

    /// A request field the parameter depends on is not available.
    #[error("request has no '{0}'")]
    Missing(&'static str),

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

impl From<ExtractError> for PylonError {
    fn from(error: ExtractError) -> Self {
        PylonError::Middleware {
            source: Box::new(error),
        }
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;
