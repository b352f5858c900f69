//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method and status
//! - `http_request_duration_seconds` (histogram): time from accept to the
//!   last response byte
//! - `http_active_connections` (gauge): current connection count
//!
//! Without an installed recorder every call here is a no-op, so the
//! engine can be embedded without exporting anything.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

const REQUESTS_TOTAL: &str = "http_requests_total";
const REQUEST_DURATION: &str = "http_request_duration_seconds";
const ACTIVE_CONNECTIONS: &str = "http_active_connections";

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    ::metrics::describe_counter!(REQUESTS_TOTAL, "Requests served, by method and status");
    ::metrics::describe_histogram!(
        REQUEST_DURATION,
        ::metrics::Unit::Seconds,
        "Time from accept to the last response byte"
    );
    ::metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Connections currently open");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished request. `method` is `"-"` when the request never
/// parsed.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    ::metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!(REQUEST_DURATION, "method" => method.to_string())
        .record(start_time.elapsed().as_secs_f64());
}

pub fn connection_opened() {
    ::metrics::gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub fn connection_closed() {
    ::metrics::gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}
