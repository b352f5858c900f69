//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming bytes:
//!     → limits.rs (line length, declared body size)
//!     → Pass to the request parser
//! ```
//!
//! # Design Decisions
//! - Fail closed: any violation ends the connection with a 400
//! - No trust in client input

pub mod limits;

pub use limits::Limits;
