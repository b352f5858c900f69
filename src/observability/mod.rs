//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection task produces:
//!     → access_log.rs (one tab-separated line per connection)
//!     → metrics.rs (counters, gauges, histograms)
//!     → logging.rs (subscriber for all structured events)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::AccessRecord;
