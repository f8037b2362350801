use std::error::Error;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/** create a non blocking tracing file appender writing `<who>.log` in datadir */
pub fn setup_file_appender<P: AsRef<Path>>(datadir: P, who: &str) -> (NonBlocking, WorkerGuard) {
    let file_appender = rolling::never(datadir.as_ref(), format!("{}.log", who));

    tracing_appender::non_blocking(file_appender)
}

/** create a RUST_LOG env based log filter with the given default level */
pub fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy()
}

/**
 * Initialize tracing-subscriber with env filter based on RUST_LOG env variable.
 * fmt layer is used to print logs to stderr, so that command output on
 * stdout stays clean.
 * fmt layer with custom writer is used to write logs to log file in datadir.
 */
pub fn init_tracing_subscriber<P: AsRef<Path>>(
    datadir: P,
    who: &str,
    default_level: Level,
) -> Result<LogGuard, Box<dyn Error>> {
    let (file_writer, file_guard) = setup_file_appender(datadir, who);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .with_target(false)
        .with_source_location(true)
        .compact();

    let stderr_layer = fmt::layer().event_format(format.clone()).with_writer(std::io::stderr);
    let file_layer =
        fmt::layer().event_format(format.with_ansi(false)).with_writer(file_writer);

    let default_subscriber = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(env_filter(default_level));

    match default_subscriber.try_init() {
        Ok(_) => Ok(LogGuard::new(file_guard)),
        Err(err) => Err(Box::new(err)),
    }
}

/// Flushes the log file when dropped
pub struct LogGuard {
    _file_appender_guard: WorkerGuard,
}

impl LogGuard {
    pub fn new(file_appender_guard: WorkerGuard) -> Self {
        Self { _file_appender_guard: file_appender_guard }
    }
}
