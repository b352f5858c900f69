//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::security::limits::Limits;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Line, body and chunk sizes.
    pub limits: Limits,

    /// Per-connection read/write deadlines.
    pub timeouts: TimeoutConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:42069").
    pub bind_address: String,

    /// Maximum concurrent connections; unbounded when unset.
    pub max_connections: Option<usize>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:42069".to_string(),
            max_connections: None,
        }
    }
}

/// Deadlines applied to each connection. Unset means wait forever.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to receive a complete request, in seconds.
    pub read_secs: Option<u64>,

    /// Time allowed to send the response, in seconds.
    pub write_secs: Option<u64>,
}

impl TimeoutConfig {
    pub fn read(&self) -> Option<Duration> {
        self.read_secs.map(Duration::from_secs)
    }

    pub fn write(&self) -> Option<Duration> {
        self.write_secs.map(Duration::from_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directives, e.g. "info" or "wirehttp=debug".
    pub log_filter: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.listener.bind_address, "0.0.0.0:42069");
        assert_eq!(config.listener.max_connections, None);
        assert_eq!(config.timeouts.read(), None);
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn parses_full_file() {
        let config: ServerConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:8080"
            max_connections = 256

            [limits]
            max_body_bytes = 1048576

            [timeouts]
            read_secs = 5
            write_secs = 10

            [observability]
            log_filter = "wirehttp=debug"
            log_format = "json"
            metrics_enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.max_connections, Some(256));
        assert_eq!(config.limits.max_body_bytes, 1_048_576);
        assert_eq!(config.limits.chunk_size, 1024);
        assert_eq!(config.timeouts.read(), Some(Duration::from_secs(5)));
        assert_eq!(config.timeouts.write(), Some(Duration::from_secs(10)));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_log_format() {
        let result: Result<ServerConfig, _> =
            toml::from_str("[observability]\nlog_format = \"xml\"\n");
        assert!(result.is_err());
    }
}
