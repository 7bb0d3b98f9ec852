//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Why a [`PylonConfig`](super::PylonConfig) could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file extension is unknown, or its format feature is disabled.
    #[error("cannot read {path:?}: unsupported configuration format '.{extension}'")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// A source could not be parsed or does not fit the schema.
    #[error(transparent)]
    Source(#[from] Box<figment::Error>),

    /// A value was read but is not acceptable.
    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }

    /// The dotted key of an invalid value, e.g. `app.api_url`.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { key, .. } => Some(*key),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Source(Box::new(error))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
