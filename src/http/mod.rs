//! HTTP/1.1 protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one task per connection)
//!     → request.rs (incremental parse: start-line → headers → body)
//!         → headers.rs (field-line parsing, duplicate merging)
//!     → Handler (fills in a ResponseWriter)
//!     → response.rs (status line, headers, fixed or chunked body)
//!     → close
//! ```

pub mod error;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use error::{ErrorKind, ParseError, RequestError, ServerError, WriteError};
pub use headers::Headers;
pub use request::{read_request, Method, Request, RequestLine, RequestParser};
pub use response::{ResponseWriter, StatusCode, WriterState};
pub use server::{Handler, Server, ServerHandle};
