//! Configuration module for the Pylon runtime.
//!
//! Settings are merged from defaults, optional TOML/YAML files and `PYLON_*`
//! environment variables, then validated before an [`App`](crate::App) is built.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, FileFormat, Profile, load_config, load_config_from_file};
pub use schema::{
    AppConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, PylonConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
