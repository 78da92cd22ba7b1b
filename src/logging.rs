//! # Logging
//!
//! Installs the global `tracing` subscriber.
//!
//! Console output follows `RUST_LOG` when set, otherwise the configured
//! level. When file logging is enabled, INFO and above also go to a daily
//! rolling file named after the process role (`drone.YYYY-MM-DD.log`,
//! `aggregator.YYYY-MM-DD.log`) under `log_dir`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{EdgeError, Result};

/// Install console and file logging for `role`.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the life of the process. `None` when file logging is disabled.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created, the file
/// appender cannot be opened, or a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig, role: &str) -> Result<Option<WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let console = fmt::layer().with_target(false).with_filter(console_filter);

    let (file, guard) = if config.file_enabled {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(role)
            .filename_suffix("log")
            .build(&config.log_dir)
            .map_err(|e| EdgeError::Logging(e.to_string()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(LevelFilter::INFO);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| EdgeError::Logging(e.to_string()))?;

    Ok(guard)
}
