//! Bramble CLI - plugin dispatcher
//!
//! Every command is a plugin. The leading arguments name a path in the
//! plugin tree; the rest are handed to the plugin untouched.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bramble_config::{Config, ensure_private_dir};
use bramble_plugins::{Dispatcher, DockerCli, Outcome};
use bramble_telemetry::setup_logging;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod config_bridge;
mod help;

/// Bramble - run installed plugins as commands
#[derive(Parser, Debug)]
#[command(name = "bramble")]
#[command(version, about, long_about = None)]
#[command(disable_help_flag = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log format: pretty, compact, json or full
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,

    /// Plugin command path followed by the plugin's own arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = Config::load().context("failed to load configuration")?;

    let log_config =
        config_bridge::to_log_config(&resolved.config, cli.verbose, cli.log_format.as_deref())?;
    if let Err(e) = setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    debug!(files = ?resolved.loaded_files, "Configuration loaded");

    ensure_private_dir(&resolved.plugins_dir).with_context(|| {
        format!(
            "failed to prepare plugin directory {}",
            resolved.plugins_dir.display()
        )
    })?;

    let runtime = Arc::new(DockerCli::new(resolved.config.docker.binary.clone()));
    let dispatcher = Dispatcher::new(resolved.plugins_dir.clone(), runtime);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match dispatcher.dispatch(&cli.args, &BTreeMap::new(), &cancel).await? {
        Outcome::Help { dir } => help::print_installed(&dir)?,
        Outcome::Completed { command } => {
            info!(command = %command.join(" "), "Plugin finished");
        },
    }
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        debug!("Interrupt received, cancelling plugin");
        cancel.cancel();
    }
}
