//! Logging setup.
//!
//! Installs a `tracing` registry with an `EnvFilter` and a console `fmt`
//! layer. When a log directory is configured, a second layer writes to a
//! daily rolling file through a non-blocking writer; the returned
//! [`WorkerGuard`] flushes that writer on drop and must be kept alive for as
//! long as logging is needed.

use crate::config::{LoggingSettings, DEFAULT_LOG_FILTER};
use crate::error::{PipeflowError, Result, ResultExt};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Base name of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "pipeflow.log";

/// `RUST_LOG` if set and valid, else the configured filter, else the default.
pub fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&settings.filter).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{}': {}", settings.filter, e);
            EnvFilter::new(DEFAULT_LOG_FILTER)
        })
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_filter(settings))
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| PipeflowError::Config(format!("Failed to install logger: {}", e)))?;

    tracing::debug!("Logging initialized");
    Ok(guard)
}
