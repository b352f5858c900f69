//! Minimal HTTP/1.1 engine over raw TCP streams.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::ServerConfig;
pub use http::{Handler, Request, ResponseWriter, Server, ServerHandle, StatusCode};
pub use lifecycle::Shutdown;
