//! Request size limits.
//!
//! # Responsibilities
//! - Cap the start-line and every header line
//! - Cap the declared request body size
//! - Size response chunks
//!
//! # Design Decisions
//! - Limits are checked while bytes are buffered (early rejection), so a
//!   slow or hostile sender can never grow the buffer past the caps
//! - There is no global cap across connections; see `ListenerConfig` for
//!   the optional connection limit

use serde::{Deserialize, Serialize};

use crate::http::headers::MAX_LINE_BYTES;

/// Default body cap: 10 MiB.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default size of one chunk in a chunked response body.
pub const CHUNK_SIZE: usize = 1024;

/// Per-request resource bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum length of the start-line and of each header line.
    pub max_line_bytes: usize,

    /// Maximum declared Content-Length.
    pub max_body_bytes: usize,

    /// Maximum payload of one outgoing chunk.
    pub chunk_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_bytes: MAX_LINE_BYTES,
            max_body_bytes: MAX_BODY_BYTES,
            chunk_size: CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_caps() {
        let limits = Limits::default();
        assert_eq!(limits.max_line_bytes, 8192);
        assert_eq!(limits.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(limits.chunk_size, 1024);
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let limits: Limits = toml::from_str("max_body_bytes = 16").unwrap();
        assert_eq!(limits.max_body_bytes, 16);
        assert_eq!(limits.max_line_bytes, MAX_LINE_BYTES);
    }
}
