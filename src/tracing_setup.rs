use eyre::{Result, WrapErr, eyre};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::{LogFormat, LoggingConfig};

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `logging.level`.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter = env_filter(&logging.level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let installed = match logging.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(false).with_span_list(true))
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .try_init(),
    };
    installed.map_err(|e| eyre!("Failed to install tracing subscriber: {e}"))?;

    tracing::debug!(level = %logging.level, format = ?logging.format, "Logging initialized");
    Ok(())
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directives_parse() {
        assert!(env_filter("info,switchyard=debug").is_ok());
    }
}
