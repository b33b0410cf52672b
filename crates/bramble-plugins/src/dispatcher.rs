//! Ties resolution, manifest loading and invocation together.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::context::InvocationContext;
use crate::error::PluginResult;
use crate::invoker::{ContainerInvoker, ExecutableInvoker, Invoker, OutputStreams};
use crate::manifest::{InvokerSpec, Manifest};
use crate::resolver::{self, Resolution};
use crate::runtime::ContainerRuntime;

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No plugin was selected; the caller should list the plugins in `dir`.
    Help {
        /// Plugin tree directory where resolution stopped.
        dir: PathBuf,
    },
    /// A plugin ran to successful completion.
    Completed {
        /// The plugin's command path.
        command: Vec<String>,
    },
}

/// Entry point for running a command line against the plugin tree.
pub struct Dispatcher {
    plugins_root: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
    streams: OutputStreams,
}

impl Dispatcher {
    /// Create a dispatcher over `plugins_root`, writing container output to
    /// the process's own stdout and stderr.
    #[must_use]
    pub fn new(plugins_root: impl Into<PathBuf>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            plugins_root: plugins_root.into(),
            runtime,
            streams: OutputStreams::inherit(),
        }
    }

    /// Replace the container output sinks.
    #[must_use]
    pub fn with_streams(mut self, streams: OutputStreams) -> Self {
        self.streams = streams;
        self
    }

    /// Root of the plugin tree.
    #[must_use]
    pub fn plugins_root(&self) -> &Path {
        &self.plugins_root
    }

    /// Build a fresh invoker for the backend `manifest` selects.
    #[must_use]
    pub fn invoker_for(&self, manifest: &Manifest) -> Box<dyn Invoker> {
        match manifest.invoker() {
            InvokerSpec::Executable { .. } => {
                Box::new(ExecutableInvoker::new(self.plugins_root.clone()))
            },
            InvokerSpec::Container { .. } => Box::new(ContainerInvoker::new(
                Arc::clone(&self.runtime),
                self.streams.clone(),
            )),
        }
    }

    /// Resolve `args` and run the selected plugin.
    ///
    /// `env` holds environment overrides for the plugin.
    ///
    /// # Errors
    ///
    /// Returns the resolution, manifest or invocation failure.
    pub async fn dispatch(
        &self,
        args: &[String],
        env: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> PluginResult<Outcome> {
        match resolver::resolve(&self.plugins_root, args)? {
            Resolution::Help { dir, .. } => {
                debug!(path = %dir.display(), "Dispatch ended at help");
                Ok(Outcome::Help { dir })
            },
            Resolution::Invoke { manifest, args } => {
                let command = self.run_manifest(&manifest, args, env, cancel).await?;
                Ok(Outcome::Completed { command })
            },
        }
    }

    /// Load the manifest at `manifest_path` and run it with `args`.
    ///
    /// Returns the plugin's command path.
    ///
    /// # Errors
    ///
    /// Returns the manifest or invocation failure.
    pub async fn run_manifest(
        &self,
        manifest_path: &Path,
        args: Vec<String>,
        env: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> PluginResult<Vec<String>> {
        let manifest = Manifest::load(manifest_path)?;
        let invoker = self.invoker_for(&manifest);
        let ctx = InvocationContext::new(args).with_envs(env.clone());

        info!(
            command = %manifest.command().join(" "),
            invoker = %invoker.kind(),
            "Invoking plugin"
        );
        invoker.invoke(&manifest, &ctx, cancel).await?;
        Ok(manifest.command().to_vec())
    }
}
