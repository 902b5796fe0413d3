//! ITCH module configuration.
//!
//! Extracts and validates the ITCH settings of a [`ConnectionConfig`].

use std::time::Duration;

use trdk_core::config::ConnectionConfig;
use trdk_core::error::FeedError;

use crate::client::{ClientConfig, DEFAULT_BUFFER_SIZE};
use crate::reconnect::ReconnectPolicy;

/// Default number of price levels per book side.
pub const DEFAULT_BOOK_LEVELS: usize = 10;

/// Longest pair name the subscribe request can carry.
const MAX_PAIR_LEN: usize = 7;

/// Parsed ITCH connection configuration.
#[derive(Debug, Clone)]
pub struct ItchConfig {
    pub name: String,
    pub client: ClientConfig,
    pub book_levels: usize,
    pub symbols: Vec<String>,
    pub snapshot_on_subscribe: bool,
    pub reconnect: ReconnectPolicy,
}

impl ItchConfig {
    pub fn from_connection(conn: &ConnectionConfig) -> Result<Self, FeedError> {
        let name = conn.module_name();
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| FeedError::Config(format!("{name}: missing \"{key}\"")))
        };

        let host = required(&conn.server_host, "server_host")?;
        let login = required(&conn.login, "login")?;
        let password = required(&conn.password, "password")?;
        let port = conn
            .server_port
            .ok_or_else(|| FeedError::Config(format!("{name}: missing \"server_port\"")))?;

        let book_levels = conn.book_levels_count.unwrap_or(DEFAULT_BOOK_LEVELS);
        if book_levels == 0 {
            return Err(FeedError::Config(format!("{name}: \"book_levels_count\" must be positive")));
        }

        let symbols = conn.symbols.clone().unwrap_or_default();
        if let Some(bad) = symbols.iter().find(|s| s.is_empty() || s.len() > MAX_PAIR_LEN) {
            return Err(FeedError::Config(format!(
                "{name}: symbol \"{bad}\" must be 1 to {MAX_PAIR_LEN} characters"
            )));
        }

        let mut reconnect = ReconnectPolicy::default();
        if let Some(r) = &conn.reconnect {
            if let Some(secs) = r.min_interval_sec {
                reconnect.min_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = r.delay_sec {
                reconnect.delay = Duration::from_secs(secs);
            }
        }

        let client = ClientConfig {
            label: name.clone(),
            host,
            port,
            login,
            password,
            initial_buffer_size: conn.initial_buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            latency_print_interval: conn
                .latency_print_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        };

        Ok(Self {
            name,
            client,
            book_levels,
            symbols,
            snapshot_on_subscribe: conn.snapshot_on_subscribe.unwrap_or(false),
            reconnect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(json: &str) -> ConnectionConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn full_config() {
        let conn = connection(
            r#"{
                "source": "itch",
                "name": "hotspot",
                "server_host": "10.0.0.1",
                "server_port": 9014,
                "login": "user",
                "password": "secret",
                "book_levels_count": 5,
                "symbols": ["EUR/USD", "USD/JPY"],
                "initial_buffer_size": 4096,
                "snapshot_on_subscribe": true,
                "latency_print_interval_ms": 1000,
                "reconnect": { "min_interval_sec": 10, "delay_sec": 2 }
            }"#,
        );
        let config = ItchConfig::from_connection(&conn).unwrap();
        assert_eq!(config.name, "hotspot");
        assert_eq!(config.client.host, "10.0.0.1");
        assert_eq!(config.client.port, 9014);
        assert_eq!(config.client.initial_buffer_size, 4096);
        assert_eq!(config.client.latency_print_interval, Some(Duration::from_secs(1)));
        assert_eq!(config.book_levels, 5);
        assert_eq!(config.symbols, vec!["EUR/USD", "USD/JPY"]);
        assert!(config.snapshot_on_subscribe);
        assert_eq!(config.reconnect.min_interval, Duration::from_secs(10));
        assert_eq!(config.reconnect.delay, Duration::from_secs(2));
    }

    #[test]
    fn defaults() {
        let conn = connection(
            r#"{ "source": "itch", "server_host": "h", "server_port": 1,
                 "login": "u", "password": "p" }"#,
        );
        let config = ItchConfig::from_connection(&conn).unwrap();
        assert_eq!(config.name, "itch_md");
        assert_eq!(config.book_levels, DEFAULT_BOOK_LEVELS);
        assert_eq!(config.client.initial_buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.client.latency_print_interval, None);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert!(config.symbols.is_empty());
    }

    #[test]
    fn rejects_invalid_settings() {
        let missing_login = connection(r#"{ "source": "itch", "server_host": "h", "server_port": 1 }"#);
        assert!(matches!(ItchConfig::from_connection(&missing_login), Err(FeedError::Config(_))));

        let long_symbol = connection(
            r#"{ "source": "itch", "server_host": "h", "server_port": 1,
                 "login": "u", "password": "p", "symbols": ["EURO/USD"] }"#,
        );
        assert!(matches!(ItchConfig::from_connection(&long_symbol), Err(FeedError::Config(_))));

        let no_levels = connection(
            r#"{ "source": "itch", "server_host": "h", "server_port": 1,
                 "login": "u", "password": "p", "book_levels_count": 0 }"#,
        );
        assert!(matches!(ItchConfig::from_connection(&no_levels), Err(FeedError::Config(_))));
    }
}
