//! `tracing` subscriber setup.
//!
//! Lines always go to the console. With a log directory they are also
//! written to a daily-rotated file named after the module, through a
//! non-blocking background writer. `RUST_LOG` overrides the level given on
//! the command line.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Call once, at start-up.
///
/// The returned guard owns the file writer; buffered lines are flushed when
/// it drops, so `main` holds it until everything else has shut down.
pub fn init_logging(level: &str, log_dir: Option<&str>, file_prefix: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = fmt::layer().with_target(true).with_thread_names(true);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_prefix));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true);
            (Some(layer.boxed()), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(filter).with(console).with(file).init();
    guard
}
