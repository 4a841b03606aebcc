//! Process-wide logging sink.
//!
//! Records go through `tracing` to a non-blocking writer: the calling
//! thread only enqueues, a background thread owned by `tracing-appender`
//! does the I/O. Hold the returned [`WorkerGuard`] until shutdown; dropping
//! it flushes what is queued.

use std::fs::OpenOptions;
use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `cfg.level`. A log file that cannot be opened, an
/// unparsable filter or a second initialisation is a configuration error.
pub fn init(cfg: &LogConfig) -> Result<WorkerGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level)
            .map_err(|e| Error::config(format!("invalid log level '{}': {e}", cfg.level)))?,
    };

    let (writer, guard, ansi) = match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    Error::config(format!("cannot open log file {}: {e}", path.display()))
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (writer, guard, false)
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(io::stderr());
            (writer, guard, true)
        }
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| Error::config(format!("logging already initialised: {e}")))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        file = ?cfg.file,
        "logging initialised"
    );
    Ok(guard)
}
