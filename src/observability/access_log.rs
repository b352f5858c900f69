//! One line per connection, tab-separated:
//!
//! ```text
//! 10.0.0.7	GET	/index.html	200	0.4ms
//! 10.0.0.9	-	-	400	1.2ms	err="unsupported http method: \"BREW\""
//! ```

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Target under which access lines are emitted.
pub const ACCESS_TARGET: &str = "wirehttp::access";

/// Outcome of one connection, as written to the access log.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRecord {
    pub remote_host: IpAddr,
    /// `"-"` when the request never parsed.
    pub method: String,
    /// `"-"` when the request never parsed.
    pub target: String,
    pub status: u16,
    pub duration: Duration,
    pub error: Option<String>,
}

impl AccessRecord {
    /// Record for a request that failed before a start-line was available.
    pub fn rejected(remote_host: IpAddr, duration: Duration, error: impl fmt::Display) -> Self {
        Self {
            remote_host,
            method: "-".to_string(),
            target: "-".to_string(),
            status: 400,
            duration,
            error: Some(error.to_string()),
        }
    }

    pub fn emit(&self) {
        tracing::info!(target: ACCESS_TARGET, "{}", self);
    }
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.duration.as_micros() as f64 / 1000.0;
        write!(
            f,
            "{}\t{}\t{}\t{}\t{:.1}ms",
            self.remote_host, self.method, self.target, self.status, millis
        )?;
        if let Some(err) = &self.error {
            write!(f, "\terr={:?}", err)?;
        }
        Ok(())
    }
}
