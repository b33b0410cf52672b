//! Environment variable overrides.
//!
//! Overrides are applied to the merged TOML tree after all files, so an
//! exported variable always wins over `config.toml`.

use std::collections::HashMap;

/// Overrides the bramble home directory (default `~/.bramble`).
pub const HOME_VAR: &str = "BRAMBLE_HOME";
/// Overrides `plugins.dir`.
pub const PLUGINS_DIR_VAR: &str = "BRAMBLE_PLUGINS_DIR";
/// Overrides `logging.level`.
pub const LOG_VAR: &str = "BRAMBLE_LOG";
/// Overrides `docker.binary`.
pub const DOCKER_VAR: &str = "BRAMBLE_DOCKER";

/// Variable → (section, key) it overrides.
const OVERRIDES: &[(&str, &str, &str)] = &[
    (PLUGINS_DIR_VAR, "plugins", "dir"),
    (LOG_VAR, "logging", "level"),
    (DOCKER_VAR, "docker", "binary"),
];

/// Snapshot the `BRAMBLE_*` variables of the current process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("BRAMBLE_"))
        .collect()
}

/// Write every set, non-empty override into `merged`. Returns how many
/// were applied.
pub(crate) fn apply_env_overrides(merged: &mut toml::Value, env_vars: &HashMap<String, String>) -> usize {
    let toml::Value::Table(root) = merged else {
        return 0;
    };

    let mut applied = 0usize;
    for (var, section, key) in OVERRIDES {
        let Some(value) = env_vars.get(*var).filter(|v| !v.is_empty()) else {
            continue;
        };
        if !root.contains_key(*section) {
            root.insert((*section).to_owned(), toml::Value::Table(toml::map::Map::new()));
        }
        if let Some(toml::Value::Table(table)) = root.get_mut(*section) {
            table.insert((*key).to_owned(), toml::Value::String(value.clone()));
            applied = applied.saturating_add(1);
        }
    }
    applied
}
