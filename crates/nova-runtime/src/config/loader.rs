//! Configuration loader using figment.
//!
//! Sources, lowest to highest priority:
//!
//! 1. Built-in defaults for the active profile
//! 2. Programmatic overrides passed to [`ConfigLoader::merge`]
//! 3. Profile-specific config file (`nova.{profile}.toml` / `nova.{profile}.yaml`)
//! 4. Main config file (`nova.toml` / `nova.yaml` / `nova.yml`)
//! 5. Environment variables (`NOVA_*`)
//!
//! # Feature Flags
//!
//! - `toml-config`: enables TOML configuration files
//! - `yaml-config`: enables YAML configuration files
//!
//! # File Discovery
//!
//! An explicit [`ConfigLoader::file`] wins, then the `NOVA_CONFIG`
//! variable, then the search paths (the current directory and the user
//! config directory's `nova/` by default).
//!
//! # Environment Variable Mapping
//!
//! - `NOVA_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `NOVA_RUNTIME__WORKERS=8` → `runtime.workers = 8`
//! - `NOVA_PROVIDER__DEFAULT=openai` → `provider.default = "openai"`
//!
//! # Example
//!
//! ```rust,ignore
//! use nova_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/nova.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::NovaConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "NOVA_";
const ENV_PROFILE: &str = "NOVA_PROFILE";
const ENV_CONFIG: &str = "NOVA_CONFIG";

/// Configuration profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Test,
    Custom(String),
}

impl Profile {
    /// Parses a profile name; unknown names become custom profiles.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            "test" => Self::Test,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
            Self::Custom(name) => name,
        }
    }

    /// Reads `NOVA_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(ENV_PROFILE)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for config files. Replaces the default
    /// search paths once any is given.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file; it must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: NovaConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<NovaConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: NovaConfig = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            workers = config.runtime.workers,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(NovaConfig::for_profile(
            &self.profile,
        )));
        figment = figment.merge(std::mem::take(&mut self.overrides));

        let explicit = self
            .config_file
            .clone()
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with NOVA_ prefix");
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["profile", "config"])
                    .split("__"),
            );
        }

        Ok(figment)
    }

    /// Merges one file, dispatching on its extension. Only extensions
    /// enabled via feature flags are accepted.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("nova"));
        }
        paths
    }

    /// Base file names searched, in order, for the enabled formats.
    fn base_names() -> Vec<&'static str> {
        let mut names = Vec::new();
        #[cfg(feature = "toml-config")]
        names.push("nova.toml");
        #[cfg(feature = "yaml-config")]
        names.extend(["nova.yaml", "nova.yml"]);
        names
    }

    /// Merges the first base file found, preceded by its profile-specific
    /// sibling when one exists.
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        for search_path in self.resolve_search_paths() {
            for base_name in Self::base_names() {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };
                let base_path = search_path.join(base_name);
                if !base_path.exists() {
                    continue;
                }

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    if let Ok(merged) = Self::merge_config_file(figment.clone(), &profile_path) {
                        figment = merged;
                    }
                }

                info!(path = %base_path.display(), "Loading configuration file");
                return match Self::merge_config_file(figment.clone(), &base_path) {
                    Ok(merged) => merged,
                    Err(_) => figment,
                };
            }
        }

        warn!("No configuration file found, using defaults");
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<NovaConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from a specific file plus the environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<NovaConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nova-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = ConfigLoader::new()
            .profile("production")
            .search_path("/nonexistent/nova")
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.runtime.workers, 4);
    }

    #[test]
    fn test_profile_selects_level() {
        let config = ConfigLoader::new()
            .profile("dev")
            .search_path("/nonexistent/nova")
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("test"), Profile::Test);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ConfigLoader::new()
            .file("/nonexistent/nova.toml")
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let path = scratch_file("nova.ini", "workers = 2");
        let err = ConfigLoader::new()
            .file(&path)
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "ini"));
    }

    #[test]
    fn test_programmatic_override() {
        let mut overrides = NovaConfig::default();
        overrides.runtime.workers = 9;
        overrides.pipeline.wake.prefixes = vec!["!".into()];

        let config = ConfigLoader::new()
            .search_path("/nonexistent/nova")
            .without_env()
            .merge(overrides)
            .load()
            .unwrap();

        assert_eq!(config.runtime.workers, 9);
        assert_eq!(config.pipeline.wake.prefixes, vec!["!"]);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut overrides = NovaConfig::default();
        overrides.runtime.queue_capacity = 0;

        let err = ConfigLoader::new()
            .search_path("/nonexistent/nova")
            .without_env()
            .merge(overrides)
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn test_env_overrides() {
        // SAFETY: no other test reads this variable.
        unsafe {
            std::env::set_var("NOVA_RUNTIME__QUEUE_CAPACITY", "17");
        }
        let config = ConfigLoader::new()
            .search_path("/nonexistent/nova")
            .load()
            .unwrap();
        unsafe {
            std::env::remove_var("NOVA_RUNTIME__QUEUE_CAPACITY");
        }
        assert_eq!(config.runtime.queue_capacity, 17);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_file() {
        let path = scratch_file(
            "explicit.toml",
            r##"
            disabled_plugins = ["spam_detector"]

            [runtime]
            workers = 2

            [pipeline.wake]
            prefixes = ["/", "#"]

            [plugins.spam_detector]
            last_time = 10
            "##,
        );

        let config = ConfigLoader::new()
            .file(&path)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.runtime.workers, 2);
        assert_eq!(config.pipeline.wake.prefixes, vec!["/", "#"]);
        assert_eq!(config.plugins["spam_detector"]["last_time"], 10);
        assert_eq!(config.disabled_plugins, vec!["spam_detector"]);
    }
}
