//! # trdk-itch
//!
//! Market data ingestion for the Hotspot-style ITCH feed.
//!
//! ## Architecture
//!
//! ```text
//! TCP ──► Client (reader task) ──► DataHandler ──► Stream ──► Security ──► BookSink
//!            ▲                                       │
//!            └── writer task ◄── heartbeat / subscribe requests
//! ```
//!
//! - [`codec`] — framing and fixed-width field codec
//! - [`client`] — one TCP connection: login, read loop, writer
//! - [`stream`] — supervisor: subscriptions, reconnect, book routing
//! - [`security`] — per-instrument order book reconstruction
//! - [`sink`] — downstream consumers of book snapshots

pub mod client;
pub mod codec;
pub mod config;
pub mod handler;
pub mod reconnect;
pub mod registry;
pub mod security;
pub mod sink;
pub mod stream;

use anyhow::Result;
use async_trait::async_trait;

/// Trait implemented by all market data modules.
#[async_trait]
pub trait MdModule: Send {
    /// Human-readable module name.
    fn name(&self) -> &str;
    /// Connect and begin processing market data.
    async fn start(&mut self) -> Result<()>;
    /// Gracefully stop all connections and tasks.
    async fn stop(&mut self) -> Result<()>;
}
