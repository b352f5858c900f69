//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, sizes and deadlines
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: `&ServerConfig → Result<(), Vec<ValidationError>>`

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::config::schema::ServerConfig;

/// One rejected configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `listener.bind_address`.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == Some(0) {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be at least 1 when set",
        ));
    }

    // The shortest valid start-line, "GET / HTTP/1.1", is 14 bytes.
    if config.limits.max_line_bytes < 16 {
        errors.push(ValidationError::new(
            "limits.max_line_bytes",
            "must be at least 16",
        ));
    }
    if config.limits.chunk_size == 0 {
        errors.push(ValidationError::new("limits.chunk_size", "must be positive"));
    }

    if config.timeouts.read_secs == Some(0) {
        errors.push(ValidationError::new("timeouts.read_secs", "must be positive when set"));
    }
    if config.timeouts.write_secs == Some(0) {
        errors.push(ValidationError::new("timeouts.write_secs", "must be positive when set"));
    }

    if let Err(e) = EnvFilter::try_new(&config.observability.log_filter) {
        errors.push(ValidationError::new("observability.log_filter", e.to_string()));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "{:?} is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
