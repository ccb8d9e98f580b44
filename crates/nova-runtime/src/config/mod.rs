//! Configuration module for the Nova runtime.
//!
//! Layered loading with figment (defaults, file, environment) and
//! validation of the merged result.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, NovaConfig, ProviderConfig,
    RuntimeConfig, SpanEventConfig,
};
pub use validation::validate_config;
