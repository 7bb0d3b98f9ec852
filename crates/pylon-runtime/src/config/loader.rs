//! Layered configuration loading with `figment`.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. [`PylonConfig::default`]
//! 2. The first `pylon.*` or `config.*` file found in the search directories
//! 3. Its profile variant, e.g. `pylon.production.toml`
//! 4. `PYLON_*` environment variables, `__` separating nested keys
//!    (`PYLON_APP__BOT_TOKEN`, `PYLON_LOGGING__LEVEL`)
//! 5. Configs passed to [`ConfigLoader::merge`]
//!
//! File formats are behind the `toml-config` and `yaml-config` features. With
//! neither enabled only the environment and programmatic sources are read.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .search_path("/etc/pylon")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
use figment::providers::{Env, Serialized};
use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::PylonConfig;

const ENV_PREFIX: &str = "PYLON_";
const PROFILE_VAR: &str = "PYLON_PROFILE";
const FILE_STEMS: &[&str] = &["pylon", "config"];

// =============================================================================
// Profile
// =============================================================================

/// Selects the `pylon.<profile>.*` override file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile(String);

impl Profile {
    pub const DEVELOPMENT: &'static str = "development";
    pub const PRODUCTION: &'static str = "production";

    /// Normalizes `name`; `dev` and `prod` expand to their long forms.
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "dev" => Self(Self::DEVELOPMENT.into()),
            "prod" => Self(Self::PRODUCTION.into()),
            "" => Self::default(),
            _ => Self(name),
        }
    }

    /// Reads `PYLON_PROFILE`.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|name| Self::new(&name))
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self(Self::DEVELOPMENT.into())
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// File formats
// =============================================================================

/// A configuration file format compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Yaml,
}

impl FileFormat {
    /// Formats enabled by cargo features, in search order.
    pub fn enabled() -> &'static [FileFormat] {
        &[
            #[cfg(feature = "toml-config")]
            FileFormat::Toml,
            #[cfg(feature = "yaml-config")]
            FileFormat::Yaml,
        ]
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Toml => &["toml"],
            Self::Yaml => &["yaml", "yml"],
        }
    }

    /// Picks the format from the file extension, if it is enabled.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::enabled()
            .iter()
            .copied()
            .find(|format| format.extensions().contains(&ext))
    }

    #[allow(unused_variables)]
    fn merge_into(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(figment::providers::Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(figment::providers::Yaml::file(path)),
            #[allow(unreachable_patterns)]
            _ => figment,
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Builds a [`PylonConfig`] from files, the environment and code.
#[derive(Debug)]
pub struct ConfigLoader {
    profile: Profile,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: bool,
    overrides: Vec<PylonConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Uses the profile from `PYLON_PROFILE` and reads the environment.
    pub fn new() -> Self {
        Self {
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            file: None,
            env: true,
            overrides: Vec::new(),
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::new(&profile.into());
        self
    }

    /// Adds a directory to search. Without any, the current directory and
    /// the user config directory (`~/.config/pylon` on Linux) are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("pylon")),
            None => self,
        }
    }

    /// Reads exactly this file instead of searching. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Layers `config` over every other source.
    pub fn merge(mut self, config: PylonConfig) -> Self {
        self.overrides.push(config);
        self
    }

    /// Returns the files that [`load`](Self::load) would read, lowest priority first.
    pub fn files(&self) -> ConfigResult<Vec<(PathBuf, FileFormat)>> {
        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.clone()));
            }
            let format = FileFormat::from_path(path).ok_or_else(|| {
                ConfigError::UnsupportedFormat {
                    path: path.clone(),
                    extension: path
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or_default()
                        .to_string(),
                }
            })?;
            return Ok(vec![(path.clone(), format)]);
        }

        Ok(self.discover().unwrap_or_default())
    }

    /// Finds the first base file and its profile variant next to it.
    fn discover(&self) -> Option<Vec<(PathBuf, FileFormat)>> {
        for dir in self.search_dirs() {
            for &format in FileFormat::enabled() {
                for stem in FILE_STEMS {
                    for ext in format.extensions() {
                        let base = dir.join(format!("{stem}.{ext}"));
                        if !base.exists() {
                            continue;
                        }
                        let mut found = vec![(base, format)];
                        let variant = dir.join(format!("{stem}.{}.{ext}", self.profile));
                        if variant.exists() {
                            found.push((variant, format));
                        }
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("pylon")))
            .collect()
    }

    /// Assembles the merged sources without extracting them.
    pub fn figment(&self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(PylonConfig::default()));

        let files = self.files()?;
        if files.is_empty() {
            debug!(profile = %self.profile, "no configuration file found");
        }
        for (path, format) in files {
            info!(path = %path.display(), "reading configuration file");
            figment = format.merge_into(figment, &path);
        }

        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }
        for config in &self.overrides {
            figment = figment.merge(Serialized::defaults(config));
        }
        Ok(figment)
    }

    pub fn load(self) -> ConfigResult<PylonConfig> {
        let config: PylonConfig = self.figment()?.extract()?;
        debug!(
            profile = %self.profile,
            level = %config.logging.level,
            has_bot_token = config.app.bot_token.is_some(),
            "configuration loaded"
        );
        Ok(config)
    }
}

/// Loads from the default locations.
pub fn load_config() -> ConfigResult<PylonConfig> {
    ConfigLoader::new().load()
}

/// Loads `path` plus environment overrides.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<PylonConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AppConfig, LogLevel};

    fn nowhere() -> PathBuf {
        std::env::temp_dir().join("pylon-config-test-nonexistent")
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = ConfigLoader::new()
            .search_path(nowhere())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.app.unhandled_request_timeout_ms, 3001);
        assert!(config.app.ignore_self);
        assert!(config.app.conversation_store);
        assert!(!config.app.process_before_response);
    }

    #[test]
    fn programmatic_overrides_win() {
        let config = ConfigLoader::new()
            .search_path(nowhere())
            .without_env()
            .merge(PylonConfig {
                app: AppConfig {
                    bot_token: Some("xoxb-test".into()),
                    process_before_response: true,
                    ..AppConfig::default()
                },
                ..PylonConfig::default()
            })
            .load()
            .unwrap();

        assert_eq!(config.app.bot_token.as_deref(), Some("xoxb-test"));
        assert!(config.app.process_before_response);
    }

    #[test]
    fn missing_explicit_file_is_reported() {
        let result = ConfigLoader::new()
            .file(nowhere().join("pylon.toml"))
            .without_env()
            .load();

        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let path = std::env::temp_dir().join("pylon-config-test.ini");
        std::fs::write(&path, "level = debug").unwrap();
        let result = ConfigLoader::new().file(&path).without_env().load();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[test]
    fn profile_names_are_normalized() {
        assert_eq!(Profile::new("PROD").as_str(), Profile::PRODUCTION);
        assert_eq!(Profile::new("dev"), Profile::default());
        assert_eq!(Profile::new(" staging ").as_str(), "staging");
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn profile_file_overrides_base_file() {
        let dir = std::env::temp_dir().join(format!("pylon-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("pylon.toml"),
            "[app]\nbot_user_id = \"UBASE\"\nprocess_before_response = true\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("pylon.production.toml"),
            "[app]\nbot_user_id = \"UPROD\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .profile("prod")
            .search_path(&dir)
            .without_env()
            .load();
        std::fs::remove_dir_all(&dir).unwrap();

        let config = config.unwrap();
        assert_eq!(config.app.bot_user_id.as_deref(), Some("UPROD"));
        assert!(config.app.process_before_response);
    }

    #[test]
    fn environment_variables_override_defaults() {
        // SAFETY: no other test reads these variables
        unsafe {
            std::env::set_var("PYLON_APP__BOT_USER_ID", "UENV");
            std::env::set_var("PYLON_LOGGING__LEVEL", "debug");
        }
        let config = ConfigLoader::new().search_path(nowhere()).load();
        unsafe {
            std::env::remove_var("PYLON_APP__BOT_USER_ID");
            std::env::remove_var("PYLON_LOGGING__LEVEL");
        }

        let config = config.unwrap();
        assert_eq!(config.app.bot_user_id.as_deref(), Some("UENV"));
        assert_eq!(config.logging.level, LogLevel::Debug);
    }
}
