//! Listing of installed plugins, shown when no plugin was selected.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use bramble_plugins::list_plugins;

/// Render the plugin listing for the given child names.
pub(crate) fn render(names: &[String]) -> String {
    if names.is_empty() {
        return "No plugins are currently installed\n".to_owned();
    }

    let mut out = String::from("The following plugins are installed:\n");
    for name in names {
        out.push('\t');
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// Print the plugins installed directly below `dir` to stdout.
pub(crate) fn print_installed(dir: &Path) -> Result<()> {
    let names = list_plugins(dir)
        .with_context(|| format!("failed to list plugins in {}", dir.display()))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(render(&names).as_bytes())?;
    stdout.flush()?;
    Ok(())
}
