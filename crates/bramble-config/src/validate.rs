//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Log levels accepted in `logging.level`.
pub const VALID_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
/// Formats accepted in `logging.format`.
pub const VALID_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_plugins(config)?;
    validate_logging(config)?;
    validate_docker(config)?;
    Ok(())
}

fn validate_plugins(config: &Config) -> ConfigResult<()> {
    if config
        .plugins
        .dir
        .as_ref()
        .is_some_and(|dir| dir.as_os_str().is_empty())
    {
        return Err(ConfigError::ValidationError {
            field: "plugins.dir".to_owned(),
            message: "plugin directory must not be empty".to_owned(),
        });
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    if !VALID_LEVELS.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                VALID_LEVELS.join(", ")
            ),
        });
    }

    if !VALID_FORMATS.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                VALID_FORMATS.join(", ")
            ),
        });
    }

    Ok(())
}

fn validate_docker(config: &Config) -> ConfigResult<()> {
    if config.docker.binary.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "docker.binary".to_owned(),
            message: "container runtime binary must not be empty".to_owned(),
        });
    }
    Ok(())
}
