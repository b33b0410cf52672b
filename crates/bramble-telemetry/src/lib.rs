//! Logging for the `bramble` front end.
//!
//! Installs a `tracing` subscriber filtered by level and per-crate
//! directives, in one of four formats, writing to stderr by default so log
//! lines never mix with plugin output on stdout.
//!
//! # Example
//!
//! ```rust,no_run
//! use bramble_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), bramble_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("bramble_plugins=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_logging};
