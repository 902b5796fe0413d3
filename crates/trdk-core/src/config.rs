//! Configuration parsing for the TRDK market data system.
//!
//! All modules read their settings from a single JSON config file. The top-level
//! structure contains logging metadata, runtime settings and a `connections`
//! array where each entry describes one market data source instance.
//!
//! # Example config (ITCH)
//!
//! ```json
//! {
//!   "logging": { "module_name": "itch_md", "log_path": "/tmp/log" },
//!   "runtime": { "io_threads": 2, "cpu_affinity_io": [2, 3] },
//!   "connections": [{
//!     "source": "itch",
//!     "server_host": "127.0.0.1",
//!     "server_port": 9014,
//!     "login": "user",
//!     "password": "secret",
//!     "book_levels_count": 10,
//!     "symbols": ["EUR/USD"],
//!     "reconnect": { "min_interval_sec": 60, "delay_sec": 30 }
//!   }]
//! }
//! ```

use serde::Deserialize;

/// Default number of I/O worker threads.
pub const DEFAULT_IO_THREADS: usize = 2;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub logging: Option<ModuleMeta>,

    /// Runtime (worker pool) settings.
    pub runtime: Option<RuntimeConfig>,

    /// Array of connection configs — one per market data source instance.
    pub connections: Vec<ConnectionConfig>,
}

impl AppConfig {
    /// Returns the module name used as the log file prefix.
    pub fn module_name(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "trdk".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.logging.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Returns the effective number of I/O worker threads (default: 2).
    pub fn io_threads(&self) -> usize {
        self.runtime
            .as_ref()
            .and_then(|r| r.io_threads)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_IO_THREADS)
    }

    /// Returns the cores the I/O worker threads are pinned to.
    pub fn cpu_affinity_io(&self) -> Vec<i32> {
        self.runtime
            .as_ref()
            .and_then(|r| r.cpu_affinity_io.clone())
            .unwrap_or_default()
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Worker pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Number of reactor worker threads (default: 2).
    pub io_threads: Option<usize>,
    /// CPU cores for the reactor worker threads, assigned round-robin.
    pub cpu_affinity_io: Option<Vec<i32>>,
}

/// A single connection/module configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Source identifier: `"itch"`.
    pub source: String,

    /// Optional label used in logs (defaults to the source identifier).
    pub name: Option<String>,

    /// Feed server host name or address.
    pub server_host: Option<String>,

    /// Feed server TCP port.
    pub server_port: Option<u16>,

    /// Login sent in the login request.
    pub login: Option<String>,

    /// Password sent in the login request.
    pub password: Option<String>,

    /// Maximum number of price levels per book side.
    pub book_levels_count: Option<usize>,

    /// Instruments to subscribe (e.g. `["EUR/USD", "USD/JPY"]`).
    pub symbols: Option<Vec<String>>,

    /// Initial receive buffer size in bytes (default: 1 MiB).
    pub initial_buffer_size: Option<usize>,

    /// Request a market snapshot right after each subscribe request.
    pub snapshot_on_subscribe: Option<bool>,

    /// Read-pass latency print interval in milliseconds (0 disables).
    pub latency_print_interval_ms: Option<u64>,

    /// Reconnect backoff settings.
    pub reconnect: Option<ReconnectConfig>,
}

impl ConnectionConfig {
    /// Returns the label for this connection.
    pub fn module_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("{}_md", self.source))
    }
}

/// Reconnect backoff settings.
///
/// A reconnect attempt that comes within `min_interval_sec` of the previous
/// attempt is delayed by `delay_sec`; otherwise it happens immediately.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    pub min_interval_sec: Option<u64>,
    pub delay_sec: Option<u64>,
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
