//! Error taxonomy for the HTTP/1.1 engine.
//!
//! # Design Decisions
//! - Protocol errors (`ParseError`) are plain data: `Clone + Eq`, so the
//!   request state machine can pin one and hand it back on every call
//! - Stream failures stay in `RequestError` / `WriteError`, which own the
//!   `io::Error`
//! - Every error reports an `ErrorKind` so callers can branch on the class
//!   without matching individual variants

use std::io;

use thiserror::Error;

use crate::net::listener::ListenerError;

/// Coarse classification shared by all engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong token count, unknown method or unsupported version.
    MalformedStartLine,
    /// Folding, bad colon placement or invalid token characters.
    MalformedHeader,
    /// A start-line or header line exceeded the per-line cap.
    TooLong,
    /// Transfer-Encoding, Content-Length or body-size violations.
    Framing,
    /// Stream failure, including an early end of stream.
    Io,
    /// Failure while serializing the response.
    Write,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedStartLine => "malformed_start_line",
            ErrorKind::MalformedHeader => "malformed_header",
            ErrorKind::TooLong => "too_long",
            ErrorKind::Framing => "framing",
            ErrorKind::Io => "io",
            ErrorKind::Write => "write",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol violation detected while parsing a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request-line: {0}")]
    MalformedRequestLine(String),
    #[error("unsupported http method: {0:?}")]
    UnsupportedMethod(String),
    #[error("unsupported http version: {0:?}")]
    UnsupportedVersion(String),
    #[error("malformed request-line: exceeds {limit} bytes")]
    RequestLineTooLong { limit: usize },
    #[error("malformed header-line: {0}")]
    MalformedHeaderLine(&'static str),
    #[error("header line too long: exceeds {limit} bytes")]
    HeaderLineTooLong { limit: usize },
    #[error("unsupported transfer-encoding: {0:?}")]
    UnsupportedTransferEncoding(String),
    #[error("bad Content-Length: {0:?}")]
    InvalidContentLength(String),
    #[error("http message exceeds body limit: {declared} > {limit} bytes")]
    MessageTooLarge { declared: u64, limit: usize },
    #[error("http body exceeds content length of {expected} bytes")]
    BodyExceedsContentLength { expected: usize },
    #[error("unexpected end of stream")]
    UnexpectedEof,
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::MalformedRequestLine(_)
            | ParseError::UnsupportedMethod(_)
            | ParseError::UnsupportedVersion(_) => ErrorKind::MalformedStartLine,
            ParseError::MalformedHeaderLine(_) => ErrorKind::MalformedHeader,
            ParseError::RequestLineTooLong { .. } | ParseError::HeaderLineTooLong { .. } => {
                ErrorKind::TooLong
            }
            ParseError::UnsupportedTransferEncoding(_)
            | ParseError::InvalidContentLength(_)
            | ParseError::MessageTooLarge { .. }
            | ParseError::BodyExceedsContentLength { .. } => ErrorKind::Framing,
            ParseError::UnexpectedEof => ErrorKind::Io,
        }
    }
}

/// Failure while reading a request off a stream.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("read deadline elapsed")]
    Timeout,
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Parse(err) => err.kind(),
            RequestError::Io(_) | RequestError::Timeout => ErrorKind::Io,
        }
    }

    /// The protocol error, when the failure was not a stream error.
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            RequestError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure while serializing a response.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
    #[error("write deadline elapsed")]
    Timeout,
    #[error("cannot {attempted} while writer is in state {state}")]
    OutOfOrder {
        attempted: &'static str,
        state: &'static str,
    },
    #[error("{0}")]
    FramingMismatch(&'static str),
    #[error("invalid response header {name:?}")]
    InvalidHeader { name: String },
}

impl WriteError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Write
    }
}

/// Failure while starting a server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Bind(#[from] ListenerError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
