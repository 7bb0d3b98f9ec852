//! Checks applied after loading, before an app is built.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, LogOutput, LoggingConfig, PylonConfig};

/// Rejects values that would only fail later, at request time.
pub fn validate_config(config: &PylonConfig) -> ConfigResult<()> {
    validate_app(&config.app)?;
    validate_logging(&config.logging)
}

fn validate_app(app: &AppConfig) -> ConfigResult<()> {
    if app.unhandled_request_timeout_ms == 0 {
        return Err(ConfigError::invalid(
            "app.unhandled_request_timeout_ms",
            "must be greater than 0",
        ));
    }
    if app.api_timeout_ms == 0 {
        return Err(ConfigError::invalid(
            "app.api_timeout_ms",
            "must be greater than 0",
        ));
    }
    if app.bot_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ConfigError::invalid("app.bot_token", "must not be blank"));
    }

    let url = app.api_url.as_str();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigError::invalid(
            "app.api_url",
            format!("'{url}' is not an http(s) URL"),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::invalid(
            "logging.file_path",
            "required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_key(config: &PylonConfig) -> Option<&'static str> {
        validate_config(config).err().and_then(|e| e.key())
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&PylonConfig::default()).is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = PylonConfig::default();
        config.app.unhandled_request_timeout_ms = 0;
        assert_eq!(
            rejected_key(&config),
            Some("app.unhandled_request_timeout_ms")
        );
    }

    #[test]
    fn api_url_needs_http_scheme() {
        let mut config = PylonConfig::default();
        config.app.api_url = "slack.com/api".into();
        assert_eq!(rejected_key(&config), Some("app.api_url"));
    }

    #[test]
    fn blank_bot_token_is_rejected() {
        let mut config = PylonConfig::default();
        config.app.bot_token = Some("  ".into());
        assert_eq!(rejected_key(&config), Some("app.bot_token"));
    }

    #[test]
    fn file_output_requires_path() {
        let mut config = PylonConfig::default();
        config.logging.output = LogOutput::File;
        assert_eq!(rejected_key(&config), Some("logging.file_path"));

        config.logging.file_path = Some("pylon.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
