//! # trdk-runner
//!
//! Main entry point for the ITCH market data system.
//!
//! Loads a JSON configuration file, builds the I/O runtime, creates one
//! market data module per configured connection and manages their
//! lifecycle. Published books are drained by a consumer thread.
//!
//! # Usage
//!
//! ```bash
//! trdk-runner config.json --log-level info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::Receiver;
use tracing::{debug, error, info};
use trdk_core::cpu_affinity;
use trdk_itch::MdModule;
use trdk_itch::sink::{BookSink, BookUpdate, ChannelSink};

/// Capacity of the channel between the modules and the book consumer.
const BOOK_CHANNEL_CAPACITY: usize = 65_536;

/// How long runtime shutdown waits for in-flight tasks.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// ITCH Market Data Runner.
#[derive(Parser)]
#[command(name = "trdk-runner", about = "ITCH Market Data Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output (overrides `logging.log_path`).
    #[arg(long)]
    log_dir: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = trdk_core::config::load_config(&cli.config)?;

    // 2. Initialize logging; the guard flushes the log file when dropped
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    let log_guard =
        trdk_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());

    info!(
        "trdk-runner starting — config={}, log_level={}, {} connection(s)",
        cli.config.display(),
        cli.log_level,
        config.connections.len(),
    );

    // 3. Build the I/O runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.io_threads())
        .thread_name("trdk-io")
        .on_thread_start(cpu_affinity::round_robin(config.cpu_affinity_io()))
        .enable_all()
        .build()?;
    info!("I/O runtime started with {} worker thread(s)", config.io_threads());

    // 4. Book consumer
    let (sink, books) = ChannelSink::bounded("books", BOOK_CHANNEL_CAPACITY);
    let sink: Arc<dyn BookSink> = Arc::new(sink);
    let consumer = std::thread::Builder::new()
        .name("trdk-books".into())
        .spawn(move || consume_books(books))?;

    // 5. Create MD modules from the connections array
    let mut md_modules: Vec<Box<dyn MdModule>> = Vec::new();
    for (idx, conn_config) in config.connections.iter().enumerate() {
        match trdk_itch::registry::create_md_module(conn_config, sink.clone()) {
            Ok(module) => {
                info!(
                    "connection[{idx}]: created MD module '{}' (source={})",
                    module.name(),
                    conn_config.source,
                );
                md_modules.push(module);
            }
            Err(e) => {
                error!("connection[{idx}]: failed to create module for '{}': {e}", conn_config.source);
            }
        }
    }

    let result = runtime.block_on(run(&mut md_modules));

    // 6. Teardown: workers first, then the modules, the consumer and the log
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    drop(md_modules);
    drop(sink);
    if consumer.join().is_err() {
        error!("book consumer thread panicked");
    }

    info!("all modules stopped — goodbye");
    drop(log_guard);
    result
}

/// Start every module, wait for Ctrl+C and stop them.
async fn run(md_modules: &mut [Box<dyn MdModule>]) -> Result<()> {
    let mut result = Ok(());
    for module in md_modules.iter_mut() {
        if let Err(e) = module.start().await {
            error!("failed to start module '{}': {e}", module.name());
            result = Err(e);
            break;
        }
        info!("module '{}' started", module.name());
    }

    if result.is_ok() {
        info!("all {} module(s) started — press Ctrl+C to stop", md_modules.len());
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!("failed to wait for shutdown signal: {e}"),
        }
    }

    for module in md_modules.iter_mut() {
        info!("stopping module '{}'", module.name());
        if let Err(e) = module.stop().await {
            error!("error stopping '{}': {e}", module.name());
        }
    }
    result
}

/// Drain published books until every sink is gone.
fn consume_books(books: Receiver<BookUpdate>) {
    let mut count: u64 = 0;
    for update in books.iter() {
        count += 1;
        debug!("{} {}", update.symbol, update.book);
    }
    info!("book consumer finished after {count} update(s)");
}
