//! Typed error definitions shared across the TRDK crates.
//!
//! Layer-specific errors (codec, client, book) live next to the code that
//! raises them; [`FeedError`] covers what is common to every module. All
//! variants implement `std::error::Error` via `thiserror`, so they integrate
//! with `anyhow::Result` at the application edge.

use thiserror::Error;

/// Domain-specific errors for the TRDK market data system.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),
}
