//! Command resolution and plugin invocation for the `bramble` front end.
//!
//! `bramble` has no commands of its own. Every command line is matched
//! against a tree of installed plugins and handed to the plugin it selects:
//!
//! - [`resolve`]: Walks the plugin tree one argument at a time
//! - [`Manifest`]: Validated `manifest.json` describing how a plugin runs
//! - [`Invoker`]: Runs a manifest, as a local executable
//!   ([`ExecutableInvoker`]) or a container ([`ContainerInvoker`])
//! - [`ContainerRuntime`]: The container engine boundary, driven by
//!   [`DockerCli`] in production
//! - [`Dispatcher`]: Resolve, load, invoke
//!
//! # Plugin Tree Layout
//!
//! ```text
//! <plugins root>/
//!   system/
//!     run/
//!       manifest.json   <- `bramble system run ...`
//!       run-bin
//!     stop/
//!       manifest.json   <- `bramble system stop ...`
//! ```
//!
//! A directory holding a `manifest.json` is a leaf; arguments after a leaf
//! are forwarded to the plugin untouched.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod context;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod manifest;
pub mod resolver;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use context::InvocationContext;
pub use discovery::list_plugins;
pub use dispatcher::{Dispatcher, Outcome};
pub use error::{ManifestError, PluginError, PluginResult};
pub use invoker::{ContainerInvoker, ExecutableInvoker, Invoker, OutputStreams};
pub use manifest::{InvokerKind, InvokerSpec, MANIFEST_FILE_NAME, Manifest, ManifestFile};
pub use resolver::{HELP_FLAG, Resolution, resolve, resolve_from};
pub use runtime::{ContainerRuntime, DockerCli};
