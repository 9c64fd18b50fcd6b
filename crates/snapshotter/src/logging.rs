use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const LOG_FILE_PREFIX: &str = "nydus-snapshotter.log";

/// Keeps the non-blocking file writer flushing; hold it for the life of the
/// process.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Build the filter, letting `RUST_LOG` override the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber: stderr always, plus a daily-rolling file
/// in `file_dir` when given.
pub fn init(level: &str, file_dir: Option<&Path>) -> LoggingGuard {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .boxed()];

    let guard = file_dir.map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed(),
        );
        guard
    });

    Registry::default()
        .with(layers)
        .with(env_filter(level))
        .init();

    LoggingGuard { _file: guard }
}
