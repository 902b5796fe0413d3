//! # trdk-core
//!
//! Core crate for the TRDK market data system, providing:
//!
//! - **Types** (`types`) — order ids, book levels and published book snapshots
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `FeedError` via thiserror
//! - **CPU affinity** (`cpu_affinity`) — thread-to-core pinning for I/O workers
//! - **Latency** (`latency`) — windowed read-pass latency percentiles
//! - **Time utilities** (`time_util`) — microsecond wall and monotonic clocks
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod cpu_affinity;
pub mod error;
pub mod latency;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
