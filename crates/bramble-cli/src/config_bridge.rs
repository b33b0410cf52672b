//! Bridge from `bramble_config::Config` to the logging setup.

use bramble_config::Config;
use bramble_telemetry::{LogConfig, LogFormat, TelemetryResult};

/// Build the log configuration, applying command-line overrides.
///
/// `--verbose` forces the `debug` level; `--log-format` replaces the
/// configured format.
pub(crate) fn to_log_config(
    config: &Config,
    verbose: bool,
    format_override: Option<&str>,
) -> TelemetryResult<LogConfig> {
    let format: LogFormat = format_override
        .unwrap_or(&config.logging.format)
        .parse()?;
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let mut log_config = LogConfig::new(level).with_format(format);
    for directive in &config.logging.directives {
        log_config = log_config.with_directive(directive.clone());
    }
    if let Some(dir) = &config.logging.directory {
        log_config = log_config.with_file_logging(dir);
    }
    Ok(log_config)
}
