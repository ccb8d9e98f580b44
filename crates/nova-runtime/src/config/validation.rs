//! Configuration validation utilities.

use std::collections::HashSet;

use nova_framework::PipelineConfig;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, NovaConfig, RuntimeConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &NovaConfig) -> ConfigResult<()> {
    validate_runtime_config(&config.runtime)?;
    validate_logging_config(&config.logging)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_plugin_names(&config.disabled_plugins)?;
    Ok(())
}

fn validate_runtime_config(runtime: &RuntimeConfig) -> ConfigResult<()> {
    if runtime.workers == 0 {
        return Err(ConfigError::validation(
            "runtime.workers must be greater than 0",
        ));
    }
    if runtime.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "runtime.queue_capacity must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

fn validate_pipeline_config(pipeline: &PipelineConfig) -> ConfigResult<()> {
    if pipeline.wake.prefixes.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::validation(
            "pipeline.wake.prefixes must not contain an empty prefix",
        ));
    }
    Ok(())
}

fn validate_plugin_names(disabled: &[String]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in disabled {
        if name.trim().is_empty() {
            return Err(ConfigError::validation(
                "disabled_plugins must not contain an empty name",
            ));
        }
        if !seen.insert(name) {
            return Err(ConfigError::validation(format!(
                "Plugin '{name}' is listed twice in disabled_plugins"
            )));
        }
    }
    Ok(())
}
