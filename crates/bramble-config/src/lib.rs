#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration for the `bramble` front end.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bramble_config::Config;
//!
//! let resolved = Config::load().unwrap();
//! println!("Plugins live in {}", resolved.plugins_dir.display());
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`BRAMBLE_PLUGINS_DIR`, `BRAMBLE_LOG`,
//!    `BRAMBLE_DOCKER`)
//! 2. **User** (`<bramble home>/config.toml`)
//! 3. **Embedded defaults** (`defaults.toml` compiled into binary)
//!
//! The bramble home is `$BRAMBLE_HOME` if set, else `~/.bramble`.

/// State directory creation.
pub mod bootstrap;
/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

// Re-export primary types at the crate root.
pub use bootstrap::ensure_private_dir;
pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use types::*;

impl Config {
    /// Load configuration from the process environment.
    ///
    /// See [`loader::load`] for the full algorithm.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the config file is malformed or the final
    /// configuration fails validation.
    pub fn load() -> ConfigResult<ResolvedConfig> {
        loader::load(None, &env::collect_env_vars())
    }

    /// Load configuration with an explicit home directory and environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the config file is malformed or the final
    /// configuration fails validation.
    pub fn load_with(
        home: Option<&Path>,
        env_vars: &HashMap<String, String>,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(home, env_vars)
    }

    /// Load configuration from a single file (no layering).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Root of the plugin tree for the given bramble home.
    ///
    /// A relative `plugins.dir` is taken relative to `home`.
    #[must_use]
    pub fn plugins_dir(&self, home: &Path) -> PathBuf {
        match &self.plugins.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => home.join(dir),
            None => home.join(loader::PLUGINS_DIR_NAME),
        }
    }
}
