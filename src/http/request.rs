//! Incremental HTTP/1.1 request parsing.
//!
//! # Responsibilities
//! - Parse the request-line (`METHOD target HTTP/1.1`)
//! - Drive the header container over a growing buffer
//! - Decide body framing from Content-Length / Transfer-Encoding
//! - Collect exactly Content-Length body bytes
//!
//! # Design Decisions
//! - `RequestParser::parse` never keeps a reference into the caller's
//!   buffer; it returns how many bytes it consumed and the caller drops
//!   that prefix
//! - States only move forward; a failure pins the parser in `Error` and
//!   the same error is returned from then on
//! - Chunked (or any other transfer-coded) request bodies are rejected

use std::fmt;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::http::error::{ParseError, RequestError};
use crate::http::headers::{find_crlf, Headers, CRLF};
use crate::security::limits::Limits;

/// Size of one read from the stream.
const READ_CHUNK: usize = 1024;

/// The request methods this server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = ParseError;

    /// Methods are case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            other => Err(ParseError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<method> <request-target> <HTTP-version>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub request_target: String,
    /// Numeric part of the version token, always `"1.1"`.
    pub http_version: String,
}

const HTTP_11: &[u8] = b"HTTP/1.1";

/// Parse a request-line from the front of `buf`.
///
/// Returns `Ok(None)` while no CRLF is buffered yet. On success the second
/// element is the number of bytes consumed, CRLF included.
pub fn parse_request_line(buf: &[u8]) -> Result<Option<(RequestLine, usize)>, ParseError> {
    let Some(end) = find_crlf(buf) else {
        return Ok(None);
    };

    let tokens: Vec<&[u8]> = buf[..end]
        .split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .collect();
    let [method, target, version] = tokens[..] else {
        return Err(ParseError::MalformedRequestLine(format!(
            "expected 3 tokens, found {}",
            tokens.len()
        )));
    };

    let method = Method::from_str(&String::from_utf8_lossy(method))?;
    if version != HTTP_11 {
        return Err(ParseError::UnsupportedVersion(
            String::from_utf8_lossy(version).into_owned(),
        ));
    }
    let request_target = std::str::from_utf8(target)
        .map_err(|_| ParseError::MalformedRequestLine("request target is not UTF-8".into()))?
        .to_string();

    let line = RequestLine {
        method,
        request_target,
        http_version: "1.1".to_string(),
    };
    Ok(Some((line, end + CRLF.len())))
}

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    None,
    ContentLength(usize),
}

/// Decide whether a request carries a body and how long it is.
pub fn body_framing(headers: &Headers, limits: &Limits) -> Result<Framing, ParseError> {
    if headers.contains("transfer-encoding") {
        let coding = headers.get("transfer-encoding").trim().to_ascii_lowercase();
        return Err(ParseError::UnsupportedTransferEncoding(coding));
    }

    let raw = headers.get("content-length").trim();
    if raw.is_empty() {
        return Ok(Framing::None);
    }

    let declared: u64 = raw
        .parse()
        .map_err(|_| ParseError::InvalidContentLength(raw.to_string()))?;
    if declared == 0 {
        return Ok(Framing::None);
    }
    if declared > limits.max_body_bytes as u64 {
        return Err(ParseError::MessageTooLarge {
            declared,
            limit: limits.max_body_bytes,
        });
    }
    Ok(Framing::ContentLength(declared as usize))
}

/// Position of a [`RequestParser`] in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParseState {
    Initialized,
    ParsingHeaders,
    ParsingBody,
    Done,
    Error,
}

impl ParseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseState::Initialized => "initialized",
            ParseState::ParsingHeaders => "parsing_headers",
            ParseState::ParsingBody => "parsing_body",
            ParseState::Done => "done",
            ParseState::Error => "error",
        }
    }
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub line: RequestLine,
    pub headers: Headers,
    /// `None` when the request declared no body.
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn method(&self) -> Method {
        self.line.method
    }

    pub fn target(&self) -> &str {
        &self.line.request_target
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Request state machine fed from a caller-owned buffer.
#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
    limits: Limits,
    line: Option<RequestLine>,
    headers: Headers,
    body: Vec<u8>,
    expected: usize,
    error: Option<ParseError>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl RequestParser {
    pub fn new(limits: Limits) -> Self {
        Self {
            state: ParseState::Initialized,
            limits,
            line: None,
            headers: Headers::new(),
            body: Vec::new(),
            expected: 0,
            error: None,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ParseState::Done
    }

    /// The error that pinned the parser, if any.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Advance over `data` and return the number of bytes consumed.
    ///
    /// `Ok(0)` with a non-terminal state means more bytes are needed.
    pub fn parse(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let mut read = 0;
        loop {
            let current = &data[read..];
            match self.state {
                ParseState::Initialized => match parse_request_line(current) {
                    Ok(Some((line, n))) => {
                        if n - CRLF.len() > self.limits.max_line_bytes {
                            return Err(self.fail(ParseError::RequestLineTooLong {
                                limit: self.limits.max_line_bytes,
                            }));
                        }
                        self.line = Some(line);
                        read += n;
                        self.state = ParseState::ParsingHeaders;
                    }
                    Ok(None) => {
                        if current.len() > self.limits.max_line_bytes {
                            return Err(self.fail(ParseError::RequestLineTooLong {
                                limit: self.limits.max_line_bytes,
                            }));
                        }
                        break;
                    }
                    Err(err) => return Err(self.fail(err)),
                },
                ParseState::ParsingHeaders => {
                    let progress = match self
                        .headers
                        .parse_with_limit(current, self.limits.max_line_bytes)
                    {
                        Ok(progress) => progress,
                        Err(err) => return Err(self.fail(err)),
                    };
                    read += progress.consumed;
                    if !progress.done {
                        break;
                    }

                    match body_framing(&self.headers, &self.limits) {
                        Ok(Framing::None) => {
                            self.state = ParseState::Done;
                            break;
                        }
                        Ok(Framing::ContentLength(expected)) => {
                            self.expected = expected;
                            self.state = ParseState::ParsingBody;
                        }
                        Err(err) => return Err(self.fail(err)),
                    }
                }
                ParseState::ParsingBody => {
                    let remaining = self.expected - self.body.len();
                    if current.len() > remaining {
                        return Err(self.fail(ParseError::BodyExceedsContentLength {
                            expected: self.expected,
                        }));
                    }
                    self.body.extend_from_slice(current);
                    read += current.len();
                    if self.body.len() == self.expected {
                        self.state = ParseState::Done;
                    }
                    break;
                }
                ParseState::Done | ParseState::Error => break,
            }
        }

        Ok(read)
    }

    /// The parsed request, once the parser reached `Done`.
    pub fn into_request(self) -> Option<Request> {
        if self.state != ParseState::Done {
            return None;
        }
        let body = (self.expected > 0).then_some(self.body);
        Some(Request {
            line: self.line?,
            headers: self.headers,
            body,
        })
    }

    fn fail(&mut self, err: ParseError) -> ParseError {
        self.state = ParseState::Error;
        self.error = Some(err.clone());
        err
    }
}

/// Read one request from `reader`.
///
/// Bytes are accumulated in a buffer owned by this call; whatever the
/// parser consumes is dropped from its front before the next read. Reads
/// stop as soon as the request is complete.
pub async fn read_request<R>(reader: &mut R, limits: &Limits) -> Result<Request, RequestError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut parser = RequestParser::new(*limits);
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    let mut scratch = [0u8; READ_CHUNK];

    while !parser.is_done() {
        let n = reader.read(&mut scratch).await?;
        if n == 0 {
            return Err(match parser.error() {
                Some(err) => err.clone().into(),
                None => ParseError::UnexpectedEof.into(),
            });
        }

        // The parser caps the buffered start-line itself while it is
        // still in `Initialized`.
        buf.extend_from_slice(&scratch[..n]);
        let consumed = parser.parse(&buf)?;
        buf.drain(..consumed);
    }

    parser
        .into_request()
        .ok_or_else(|| ParseError::UnexpectedEof.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorKind;
    use tokio::io::AsyncWriteExt;

    fn parse_whole(data: &[u8]) -> Result<Request, ParseError> {
        let mut parser = RequestParser::default();
        parser.parse(data)?;
        Ok(parser.into_request().expect("request incomplete"))
    }

    fn parse_bytewise(data: &[u8]) -> Result<Request, ParseError> {
        let mut parser = RequestParser::default();
        let mut buf = Vec::new();
        for byte in data {
            buf.push(*byte);
            let consumed = parser.parse(&buf)?;
            buf.drain(..consumed);
        }
        Ok(parser.into_request().expect("request incomplete"))
    }

    /// Feed `data` through a duplex pipe that moves `chunk` bytes at a time.
    async fn read_fragmented(data: &'static [u8], chunk: usize) -> Result<Request, RequestError> {
        let (mut client, mut server) = tokio::io::duplex(chunk);
        tokio::spawn(async move {
            let _ = client.write_all(data).await;
        });
        read_request(&mut server, &Limits::default()).await
    }

    #[test]
    fn parses_request_line() {
        let (line, n) = parse_request_line(b"GET /coffee HTTP/1.1\r\nHost: x\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(line.method, Method::Get);
        assert_eq!(line.request_target, "/coffee");
        assert_eq!(line.http_version, "1.1");
        assert_eq!(n, 22);
    }

    #[test]
    fn request_line_suspends_without_crlf() {
        assert_eq!(parse_request_line(b"GET /coffee HTTP/1.1").unwrap(), None);
        assert_eq!(parse_request_line(b"").unwrap(), None);
    }

    #[test]
    fn request_line_splits_on_whitespace_runs() {
        let (line, _) = parse_request_line(b"POST \t /a   HTTP/1.1\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(line.method, Method::Post);
        assert_eq!(line.request_target, "/a");
    }

    #[test]
    fn request_line_rejects_wrong_token_count() {
        let err = parse_request_line(b"/coffee HTTP/1.1\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequestLine(_)));

        let err = parse_request_line(b"GET /coffee HTTP/1.1 extra\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequestLine(_)));
    }

    #[test]
    fn request_line_rejects_unknown_method() {
        let err = parse_request_line(b"BREW /pot HTTP/1.1\r\n").unwrap_err();
        assert_eq!(err, ParseError::UnsupportedMethod("BREW".into()));

        let err = parse_request_line(b"get / HTTP/1.1\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedStartLine);
    }

    #[test]
    fn request_line_rejects_other_versions() {
        let lines: [&[u8]; 3] = [b"GET / HTTP/1.0\r\n", b"GET / HTTP/2\r\n", b"GET / http/1.1\r\n"];
        for line in lines {
            let err = parse_request_line(line).unwrap_err();
            assert!(matches!(err, ParseError::UnsupportedVersion(_)));
        }
    }

    #[test]
    fn accepts_every_allowed_method() {
        for name in [
            "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
        ] {
            let method: Method = name.parse().unwrap();
            assert_eq!(method.as_str(), name);
        }
    }

    #[test]
    fn parses_request_without_body() {
        let request =
            parse_whole(b"GET / HTTP/1.1\r\nHost: localhost:42069\r\nAccept: */*\r\n\r\n").unwrap();
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.target(), "/");
        assert_eq!(request.header("HOST"), "localhost:42069");
        assert_eq!(request.header("accept"), "*/*");
        assert_eq!(request.body, None);
    }

    #[test]
    fn parses_content_length_body() {
        let request = parse_whole(
            b"POST /submit HTTP/1.1\r\nHost: localhost\r\nContent-Length: 13\r\n\r\nhello world!\n",
        )
        .unwrap();
        assert_eq!(request.body(), b"hello world!\n");
    }

    #[test]
    fn zero_content_length_means_no_body() {
        let request = parse_whole(b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n").unwrap();
        assert_eq!(request.body, None);
    }

    #[test]
    fn merges_duplicate_headers() {
        let request =
            parse_whole(b"GET / HTTP/1.1\r\nX: a\r\nX: b\r\nX: c\r\n\r\n").unwrap();
        assert_eq!(request.header("x"), "a,b,c");
    }

    #[test]
    fn bytewise_parse_matches_whole_parse() {
        let inputs: [&[u8]; 3] = [
            b"GET / HTTP/1.1\r\nHost: localhost:42069\r\nUser-Agent: curl/7.81.0\r\n\r\n",
            b"POST /a/b?c=d HTTP/1.1\r\nContent-Length: 11\r\nX: 1\r\nX: 2\r\n\r\nhello world",
            b"DELETE /items/7 HTTP/1.1\r\n\r\n",
        ];
        for input in inputs {
            assert_eq!(parse_bytewise(input).unwrap(), parse_whole(input).unwrap());
        }
    }

    #[test]
    fn needs_more_reports_zero() {
        let mut parser = RequestParser::default();
        assert_eq!(parser.parse(b"GET / HT").unwrap(), 0);
        assert_eq!(parser.state(), ParseState::Initialized);
    }

    #[test]
    fn states_advance_in_order() {
        let mut parser = RequestParser::default();
        let consumed = parser.parse(b"POST / HTTP/1.1\r\nContent-Le").unwrap();
        assert_eq!(consumed, 17);
        assert_eq!(parser.state(), ParseState::ParsingHeaders);

        let consumed = parser.parse(b"Content-Length: 4\r\n\r\nab").unwrap();
        assert_eq!(consumed, 23);
        assert_eq!(parser.state(), ParseState::ParsingBody);

        let consumed = parser.parse(b"cd").unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(parser.state(), ParseState::Done);
        assert_eq!(parser.into_request().unwrap().body(), b"abcd");
    }

    #[test]
    fn error_is_pinned() {
        let mut parser = RequestParser::default();
        let err = parser.parse(b"GET / HTTP/1.1\r\n folded: x\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedHeaderLine(_)));
        assert_eq!(parser.state(), ParseState::Error);

        let again = parser.parse(b"Host: fine\r\n\r\n").unwrap_err();
        assert_eq!(again, err);
        assert_eq!(parser.error(), Some(&err));
        assert!(parser.into_request().is_none());
    }

    #[test]
    fn rejects_any_transfer_encoding() {
        let err = parse_whole(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap_err();
        assert_eq!(err, ParseError::UnsupportedTransferEncoding("chunked".into()));

        let err = parse_whole(b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Framing);
    }

    #[test]
    fn rejects_invalid_content_length() {
        for value in ["abc", "-1", "5,5", "1.5"] {
            let input = format!("POST / HTTP/1.1\r\nContent-Length: {value}\r\n\r\n");
            let err = parse_whole(input.as_bytes()).unwrap_err();
            assert_eq!(err, ParseError::InvalidContentLength(value.into()));
        }
    }

    #[test]
    fn duplicate_content_length_is_rejected() {
        let err = parse_whole(b"POST / HTTP/1.1\r\nContent-Length: 5\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap_err();
        assert_eq!(err, ParseError::InvalidContentLength("5,5".into()));
    }

    #[test]
    fn rejects_oversized_declared_body() {
        let err = parse_whole(b"POST / HTTP/1.1\r\nContent-Length: 10485761\r\n\r\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::MessageTooLarge {
                declared: 10 * 1024 * 1024 + 1,
                limit: 10 * 1024 * 1024
            }
        );
    }

    #[test]
    fn rejects_body_past_content_length() {
        let err = parse_whole(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello world").unwrap_err();
        assert_eq!(err, ParseError::BodyExceedsContentLength { expected: 5 });
    }

    #[test]
    fn rejects_long_start_line() {
        let mut input = b"GET /".to_vec();
        input.extend(std::iter::repeat(b'a').take(9000));
        let mut parser = RequestParser::default();
        let err = parser.parse(&input).unwrap_err();
        assert_eq!(err, ParseError::RequestLineTooLong { limit: 8192 });
        assert_eq!(err.kind(), ErrorKind::TooLong);
    }

    #[tokio::test]
    async fn reads_request_one_byte_at_a_time() {
        let input: &'static [u8] =
            b"PUT /upload HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let request = read_fragmented(input, 1).await.unwrap();
        assert_eq!(request, parse_whole(input).unwrap());
    }

    #[tokio::test]
    async fn reads_request_in_odd_fragments() {
        let input: &'static [u8] = b"GET /path HTTP/1.1\r\nHost: localhost\r\nX: 1\r\nX: 2\r\n\r\n";
        for chunk in [2, 3, 7, 64] {
            let request = read_fragmented(input, chunk).await.unwrap();
            assert_eq!(request.header("x"), "1,2");
            assert_eq!(request.target(), "/path");
        }
    }

    #[tokio::test]
    async fn short_body_is_unexpected_eof() {
        let mut input: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel";
        let err = read_request(&mut input, &Limits::default()).await.unwrap_err();
        assert!(matches!(err, RequestError::Parse(ParseError::UnexpectedEof)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn long_body_is_rejected() {
        let mut input: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello!!";
        let err = read_request(&mut input, &Limits::default()).await.unwrap_err();
        assert!(matches!(
            err,
            RequestError::Parse(ParseError::BodyExceedsContentLength { expected: 5 })
        ));
    }

    #[tokio::test]
    async fn empty_stream_is_unexpected_eof() {
        let mut input: &[u8] = b"";
        let err = read_request(&mut input, &Limits::default()).await.unwrap_err();
        assert!(matches!(err, RequestError::Parse(ParseError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn unterminated_start_line_hits_cap() {
        let mut data = b"GET /".to_vec();
        data.extend(std::iter::repeat(b'a').take(10_000));
        let mut input = &data[..];
        let err = read_request(&mut input, &Limits::default()).await.unwrap_err();
        assert!(matches!(
            err,
            RequestError::Parse(ParseError::RequestLineTooLong { limit: 8192 })
        ));
    }

    #[tokio::test]
    async fn stops_reading_after_complete_request() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\n\r\n";
        let request = read_request(&mut input, &Limits::default()).await.unwrap();
        assert_eq!(request.method(), Method::Get);
        assert!(request.headers.is_empty());
    }
}
