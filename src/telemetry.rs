//! Tracing subscriber setup for the binaries.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber: stdout plus an optional log file.
///
/// `RUST_LOG` takes precedence over `logging.level`. The returned guard flushes the
/// file writer on drop and must be held for the lifetime of the process.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid logging.level {:?}", config.level))?;

    let console_layer = if config.json {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_level(true).compact().boxed()
    };

    let file = config.file.trim();
    let (file_layer, guard) = if file.is_empty() {
        (None, None)
    } else {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .with_context(|| format!("logging.file {file:?} has no file name"))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;

        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
        let layer = if config.json {
            fmt::layer()
                .with_writer(writer)
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .boxed()
        } else {
            fmt::layer().with_writer(writer).with_ansi(false).boxed()
        };
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}
