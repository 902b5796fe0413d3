//! Module registry — factory for creating MD modules from config.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use trdk_core::config::ConnectionConfig;

use crate::MdModule;
use crate::config::ItchConfig;
use crate::sink::BookSink;
use crate::stream::Stream;

/// Create an `MdModule` based on the `source` field in the config. Every
/// module publishes its books into `sink`.
pub fn create_md_module(
    config: &ConnectionConfig,
    sink: Arc<dyn BookSink>,
) -> Result<Box<dyn MdModule>> {
    match config.source.to_lowercase().as_str() {
        "itch" => {
            let config = ItchConfig::from_connection(config)?;
            Ok(Box::new(Stream::new(config, sink)))
        }
        other => Err(anyhow!("Unknown source: {other}")),
    }
}
