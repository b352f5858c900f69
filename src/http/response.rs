//! HTTP/1.1 response serialization.
//!
//! # Responsibilities
//! - Emit the status line, the header block and the body
//! - Overlay handler-set headers onto the defaults
//! - Frame the body by Content-Length or as 1 KiB chunks
//!
//! # Design Decisions
//! - The writer tracks which phase may run next; calls out of order are
//!   reported as `WriteError::OutOfOrder` instead of corrupting the stream
//! - `Transfer-Encoding: chunked` wins over Content-Length when both are set
//! - Headers are emitted sorted by lower-cased name in canonical case
//! - Header names/values are validated before any header byte is written

use std::fmt;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::error::WriteError;
use crate::http::headers::{canonical_name, is_token, Headers};
use crate::security::limits::CHUNK_SIZE;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Literal response for requests that fail to parse.
pub const BAD_REQUEST_RESPONSE: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// Numeric HTTP status; any value may go on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Reason phrase, `"Unknown"` outside the status table.
    pub fn reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// Baseline headers for a fixed-length plain-text response.
pub fn default_headers(content_length: usize) -> Headers {
    let mut headers = Headers::new();
    headers.set("content-length", &content_length.to_string());
    headers.set("connection", "close");
    headers.set("content-type", "text/plain");
    headers
}

fn token_list_contains(list: &str, token: &str) -> bool {
    list.split(',').any(|item| item.trim() == token)
}

/// Serialization phase the writer accepts next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    StatusLine,
    Headers,
    Body,
    ChunkedBody,
    Done,
}

impl WriterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriterState::StatusLine => "status_line",
            WriterState::Headers => "headers",
            WriterState::Body => "body",
            WriterState::ChunkedBody => "chunked_body",
            WriterState::Done => "done",
        }
    }
}

/// Response builder and serializer for one connection.
///
/// Handlers only use the setters (`set_status`, `headers_mut`,
/// `set_body`); the connection task then calls
/// [`ResponseWriter::write_response`], so a handler's chunked body is
/// buffered in full before it is sent. The async phase methods are for
/// code that drives the writer directly over its own stream.
pub struct ResponseWriter<'a> {
    stream: &'a mut (dyn AsyncWrite + Unpin + Send),
    state: WriterState,
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    chunked: bool,
    chunk_size: usize,
}

impl fmt::Debug for ResponseWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl<'a> ResponseWriter<'a> {
    /// A writer preloaded with status 200, no overrides and an empty body.
    pub fn new(stream: &'a mut (dyn AsyncWrite + Unpin + Send)) -> Self {
        Self {
            stream,
            state: WriterState::StatusLine,
            status: StatusCode::OK,
            headers: Headers::new(),
            body: Vec::new(),
            chunked: false,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: impl Into<StatusCode>) {
        self.status = status.into();
    }

    /// Writer-level headers; these override the defaults on output.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    /// `HTTP/1.1 <code> <reason>\r\n`
    pub async fn write_status_line(&mut self, status: StatusCode) -> Result<(), WriteError> {
        self.ensure_state(&[WriterState::StatusLine], "write the status line")?;
        let line = format!("{HTTP_VERSION} {} {}\r\n", status.as_u16(), status.reason());
        self.stream.write_all(line.as_bytes()).await?;
        self.state = WriterState::Headers;
        Ok(())
    }

    /// Emit `headers` overlaid with the writer-level headers.
    pub async fn write_headers(&mut self, mut headers: Headers) -> Result<(), WriteError> {
        self.ensure_state(&[WriterState::Headers], "write headers")?;

        for (name, value) in self.headers.iter() {
            headers.override_value(name, value);
        }
        self.chunked = token_list_contains(headers.get("transfer-encoding"), "chunked");
        if self.chunked {
            headers.delete("content-length");
        }

        let mut block = String::new();
        for (name, value) in headers.iter() {
            if !is_token(name.as_bytes()) || value.contains(['\r', '\n']) {
                return Err(WriteError::InvalidHeader {
                    name: name.to_string(),
                });
            }
            block.push_str(&canonical_name(name));
            block.push_str(": ");
            block.push_str(value);
            block.push_str("\r\n");
        }
        block.push_str("\r\n");

        self.stream.write_all(block.as_bytes()).await?;
        self.state = WriterState::Body;
        Ok(())
    }

    /// Write body bytes verbatim; the headers declared their length.
    pub async fn write_body(&mut self, bytes: &[u8]) -> Result<usize, WriteError> {
        self.ensure_state(&[WriterState::Body], "write a body")?;
        if self.chunked {
            return Err(WriteError::FramingMismatch(
                "fixed body after Transfer-Encoding: chunked was declared",
            ));
        }
        self.stream.write_all(bytes).await?;
        Ok(bytes.len())
    }

    /// Write `bytes` as `<hex-len>\r\n<data>\r\n` chunks.
    pub async fn write_chunked_body(&mut self, bytes: &[u8]) -> Result<usize, WriteError> {
        self.ensure_state(
            &[WriterState::Body, WriterState::ChunkedBody],
            "write a chunked body",
        )?;
        if !self.chunked {
            return Err(WriteError::FramingMismatch(
                "chunked body without Transfer-Encoding: chunked",
            ));
        }
        self.state = WriterState::ChunkedBody;

        for chunk in bytes.chunks(self.chunk_size) {
            self.stream
                .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                .await?;
            self.stream.write_all(chunk).await?;
            self.stream.write_all(b"\r\n").await?;
        }
        Ok(bytes.len())
    }

    /// Terminate a chunked body with `0\r\n\r\n`.
    pub async fn close_chunked_body(&mut self) -> Result<(), WriteError> {
        self.ensure_state(
            &[WriterState::Body, WriterState::ChunkedBody],
            "close a chunked body",
        )?;
        if !self.chunked {
            return Err(WriteError::FramingMismatch(
                "chunk terminator without Transfer-Encoding: chunked",
            ));
        }
        self.stream.write_all(b"0\r\n\r\n").await?;
        self.state = WriterState::Done;
        Ok(())
    }

    /// Serialize the buffered status, headers and body.
    pub async fn write_response(&mut self) -> Result<(), WriteError> {
        let status = self.status;
        let body = std::mem::take(&mut self.body);

        self.write_status_line(status).await?;
        self.write_headers(default_headers(body.len())).await?;
        if self.chunked {
            self.write_chunked_body(&body).await?;
            self.close_chunked_body().await?;
        } else {
            self.write_body(&body).await?;
            self.state = WriterState::Done;
        }
        self.stream.flush().await?;
        Ok(())
    }

    fn ensure_state(&self, allowed: &[WriterState], attempted: &'static str) -> Result<(), WriteError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(WriteError::OutOfOrder {
                attempted,
                state: self.state.as_str(),
            })
        }
    }
}
