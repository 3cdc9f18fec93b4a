//! Logging infrastructure.
//!
//! Structured tracing output to a session log file plus stdout, filtered
//! by `RUST_LOG` (default `info`). The file writer is non-blocking so
//! logging never stalls an enrichment session.

use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default log file name.
pub const LOG_FILE: &str = "skycat.log";

/// Keeps the non-blocking file writer alive.
///
/// Dropping the guard flushes and closes the log file; hold it for the
/// lifetime of the process.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the global tracing subscriber.
///
/// Creates `log_dir` if needed and writes `skycat.log` inside it,
/// mirroring everything to stdout.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created. Calling this
/// twice in one process fails inside tracing's global registry; call it
/// once at startup.
pub fn init_logging(log_dir: &Path) -> Result<LoggingGuard, io::Error> {
    std::fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(false);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
