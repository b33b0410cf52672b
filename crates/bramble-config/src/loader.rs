//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Resolve the bramble home (`BRAMBLE_HOME`, else `~/.bramble`)
//! 2. Parse `defaults.toml` → base
//! 3. Merge `<home>/config.toml` if present
//! 4. Apply `BRAMBLE_*` environment overrides
//! 5. Deserialize merged tree → `Config`
//! 6. Validate
//! 7. Resolve the plugin directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{HOME_VAR, apply_env_overrides};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Name of the user config file inside the bramble home.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Name of the bramble home below the user's home directory.
pub const HOME_DIR_NAME: &str = ".bramble";
/// Default plugin tree name inside the bramble home.
pub const PLUGINS_DIR_NAME: &str = "plugins";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// The bramble home directory.
    pub home: PathBuf,
    /// Absolute root of the plugin tree.
    pub plugins_dir: PathBuf,
    /// Config files that were merged, in order.
    pub loaded_files: Vec<String>,
}

/// Load the configuration with layered precedence.
///
/// `home_override` replaces the bramble home discovery (useful for tests
/// and `--home`-style flags). `env_vars` is the environment to read
/// overrides from; pass [`collect_env_vars`](crate::env::collect_env_vars)
/// for the process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the home directory cannot be determined,
/// the config file is unreadable or malformed, or the merged configuration
/// fails validation.
pub fn load(
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let home = resolve_home(home_override, env_vars)?;

    // 1. Parse embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut loaded_files = Vec::new();

    // 2. User config.
    let user_path = home.join(CONFIG_FILE_NAME);
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge(&mut merged, &overlay);
        loaded_files.push(user_path.display().to_string());
        info!(path = %user_path.display(), "loaded user config");
    }

    // 3. Environment overrides.
    let env_count = apply_env_overrides(&mut merged, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable overrides");
    }

    // 4. Deserialize and validate.
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;

    let plugins_dir = config.plugins_dir(&home);
    debug!(home = %home.display(), plugins = %plugins_dir.display(), "resolved state directories");

    Ok(ResolvedConfig {
        config,
        home,
        plugins_dir,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;

    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;

    validate::validate(&config)?;
    Ok(config)
}

/// The bramble home: the override, else `BRAMBLE_HOME`, else `~/.bramble`.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDir`] if neither is given and the user's
/// home directory is unknown.
pub fn resolve_home(
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<PathBuf> {
    if let Some(home) = home_override {
        return Ok(home.to_path_buf());
    }
    if let Some(home) = env_vars.get(HOME_VAR).filter(|h| !h.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    Ok(home_directory()?.join(HOME_DIR_NAME))
}

/// Recursively deep-merge `overlay` into `base`.
///
/// - Tables merge recursively per-field.
/// - Scalars and arrays from the overlay **replace** the base value.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Uses a single read operation to avoid TOCTOU races (no separate
/// exists/metadata checks before reading).
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    let len = u64::try_from(content.len()).unwrap_or(u64::MAX);
    if len > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {len} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
