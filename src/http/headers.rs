//! Case-insensitive header container and incremental header-block parser.
//!
//! # Responsibilities
//! - Store one value per lower-cased field name
//! - Merge repeated fields by comma-joining in arrival order
//! - Parse header lines out of a partially filled buffer
//!
//! # Design Decisions
//! - Names are lower-cased on every entry point, so lookups never allocate
//!   a second normalized copy of the map
//! - Backed by a `BTreeMap`: serialization wants sorted names anyway
//! - Obsolete line folding is rejected, not unfolded

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::http::error::ParseError;

/// Per-line cap for start-lines and header lines.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Octets allowed in a field-name token: `[A-Za-z0-9!#$%&'*+-.^_`|~]`.
static TOKEN: [bool; 256] = build_token_table();

const fn build_token_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut c = 0;
    while c < 128 {
        let b = c as u8;
        table[c] = b.is_ascii_alphanumeric();
        c += 1;
    }
    let extra = b"!#$%&'*+-.^_`|~";
    let mut i = 0;
    while i < extra.len() {
        table[extra[i] as usize] = true;
        i += 1;
    }
    table
}

/// Reports whether `bytes` is a non-empty RFC token.
pub fn is_token(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|b| TOKEN[*b as usize])
}

/// `content-type` → `Content-Type`.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|window| window == CRLF)
}

/// Outcome of one [`Headers::parse`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderProgress {
    /// Bytes of complete lines consumed, terminators included.
    pub consumed: usize,
    /// The blank line ending the header block was seen.
    pub done: bool,
}

/// Field-name → value map with case-insensitive access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `name`, or `""` when the field is absent.
    pub fn get(&self, name: &str) -> &str {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&name.to_ascii_lowercase())
    }

    /// Insert `value`, comma-joining onto any existing value.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.fields.entry(name.to_ascii_lowercase()) {
            btree_map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.push(',');
                existing.push_str(value);
            }
            btree_map::Entry::Vacant(entry) => {
                entry.insert(value.to_string());
            }
        }
    }

    /// Replace any existing value for `name`.
    pub fn override_value(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn delete(&mut self, name: &str) {
        self.fields.remove(&name.to_ascii_lowercase());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields ordered by lower-cased name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse header lines from `buf` with the default line cap.
    pub fn parse(&mut self, buf: &[u8]) -> Result<HeaderProgress, ParseError> {
        self.parse_with_limit(buf, MAX_LINE_BYTES)
    }

    /// Parse as many complete header lines as `buf` holds.
    ///
    /// Lines are merged as they are read. When the buffer ends mid-line the
    /// returned `consumed` covers only the lines already merged, so the
    /// caller can drop that prefix and call again once more bytes arrive.
    pub fn parse_with_limit(
        &mut self,
        buf: &[u8],
        max_line: usize,
    ) -> Result<HeaderProgress, ParseError> {
        let mut offset = 0;
        loop {
            let rest = &buf[offset..];
            let Some(len) = find_crlf(rest) else {
                if rest.len() > max_line {
                    return Err(ParseError::HeaderLineTooLong { limit: max_line });
                }
                return Ok(HeaderProgress {
                    consumed: offset,
                    done: false,
                });
            };
            if len > max_line {
                return Err(ParseError::HeaderLineTooLong { limit: max_line });
            }

            let line = &rest[..len];
            offset += len + CRLF.len();

            if line.is_empty() {
                return Ok(HeaderProgress {
                    consumed: offset,
                    done: true,
                });
            }

            let (name, value) = split_field(line)?;
            self.set(&name, &value);
        }
    }
}

fn split_field(line: &[u8]) -> Result<(String, String), ParseError> {
    if line[0] == b' ' || line[0] == b'\t' {
        return Err(ParseError::MalformedHeaderLine("obsolete line folding"));
    }

    let colon = match line.iter().position(|b| *b == b':') {
        Some(0) => return Err(ParseError::MalformedHeaderLine("empty field name")),
        Some(index) => index,
        None => return Err(ParseError::MalformedHeaderLine("missing colon")),
    };

    let raw_name = &line[..colon];
    if raw_name.iter().any(|b| *b == b' ' || *b == b'\t') {
        return Err(ParseError::MalformedHeaderLine("whitespace in field name"));
    }
    if !is_token(raw_name) {
        return Err(ParseError::MalformedHeaderLine("invalid field name"));
    }

    // Token octets are ASCII, so the name is valid UTF-8.
    let name = String::from_utf8_lossy(raw_name).to_ascii_lowercase();
    let value = std::str::from_utf8(&line[colon + 1..])
        .map_err(|_| ParseError::MalformedHeaderLine("header value is not UTF-8"))?
        .trim_matches(|c: char| c == ' ' || c == '\t')
        .to_string();
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_header() {
        let mut headers = Headers::new();
        let data = b"Host: localhost:42069\r\n\r\n";
        let progress = headers.parse(data).unwrap();

        assert_eq!(headers.get("host"), "localhost:42069");
        assert_eq!(progress.consumed, data.len());
        assert!(progress.done);
    }

    #[test]
    fn rejects_non_utf8_value() {
        let mut headers = Headers::new();
        let err = headers.parse(b"X-Name: caf\xe9\r\n\r\n").unwrap_err();

        assert_eq!(
            err,
            ParseError::MalformedHeaderLine("header value is not UTF-8")
        );
        assert!(!headers.contains("x-name"));
    }

    #[test]
    fn keeps_utf8_value_unchanged() {
        let mut headers = Headers::new();
        headers.parse("X-Name: café\r\n\r\n".as_bytes()).unwrap();
        assert_eq!(headers.get("x-name").as_bytes(), b"caf\xc3\xa9");
    }

    #[test]
    fn trims_optional_whitespace() {
        let mut headers = Headers::new();
        let data = b"Host:    localhost:42069   \r\nX-Empty:\t\r\n\r\n";
        let progress = headers.parse(data).unwrap();

        assert!(progress.done);
        assert_eq!(headers.get("HOST"), "localhost:42069");
        assert!(headers.contains("x-empty"));
        assert_eq!(headers.get("x-empty"), "");
    }

    #[test]
    fn merges_duplicate_fields_in_order() {
        let mut headers = Headers::new();
        let data = b"Host: localhost:42069\r\nX-Person: some1\r\nx-person: some2\r\nX-PERSON: some3\r\n\r\n";
        let progress = headers.parse(data).unwrap();

        assert!(progress.done);
        assert_eq!(headers.get("host"), "localhost:42069");
        assert_eq!(headers.get("x-person"), "some1,some2,some3");
    }

    #[test]
    fn suspends_on_partial_line() {
        let mut headers = Headers::new();
        let data = b"Host: localhost\r\nUser-Ag";
        let progress = headers.parse(data).unwrap();

        assert_eq!(
            progress,
            HeaderProgress {
                consumed: 17,
                done: false
            }
        );
        assert_eq!(headers.get("host"), "localhost");

        let progress = headers.parse(b"User-Agent: curl\r\n\r\n").unwrap();
        assert!(progress.done);
        assert_eq!(headers.get("host"), "localhost");
        assert_eq!(headers.get("user-agent"), "curl");
    }

    #[test]
    fn empty_buffer_needs_more() {
        let mut headers = Headers::new();
        let progress = headers.parse(b"").unwrap();
        assert_eq!(
            progress,
            HeaderProgress {
                consumed: 0,
                done: false
            }
        );
    }

    #[test]
    fn leaves_bytes_after_blank_line() {
        let mut headers = Headers::new();
        let data = b"A: 1\r\n\r\nbody";
        let progress = headers.parse(data).unwrap();
        assert!(progress.done);
        assert_eq!(&data[progress.consumed..], b"body");
    }

    #[test]
    fn rejects_obsolete_folding() {
        let mut headers = Headers::new();
        let err = headers.parse(b"A: 1\r\n continued\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedHeaderLine(_)));

        let err = Headers::new().parse(b"\tA: 1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedHeaderLine(_)));
    }

    #[test]
    fn rejects_bad_colon_placement() {
        let err = Headers::new().parse(b"NoColon\r\n\r\n").unwrap_err();
        assert_eq!(err, ParseError::MalformedHeaderLine("missing colon"));

        let err = Headers::new().parse(b": value\r\n\r\n").unwrap_err();
        assert_eq!(err, ParseError::MalformedHeaderLine("empty field name"));

        let err = Headers::new().parse(b"Host : value\r\n\r\n").unwrap_err();
        assert_eq!(err, ParseError::MalformedHeaderLine("whitespace in field name"));
    }

    #[test]
    fn rejects_non_token_names() {
        let lines: [&[u8]; 3] = [b"H\xc2\xa9st: x\r\n\r\n", b"X(y): z\r\n\r\n", b"a\"b: c\r\n\r\n"];
        for line in lines {
            let err = Headers::new().parse(line).unwrap_err();
            assert_eq!(err, ParseError::MalformedHeaderLine("invalid field name"));
        }
    }

    #[test]
    fn accepts_token_punctuation() {
        let mut headers = Headers::new();
        headers
            .parse(b"X!#$%&'*+-.^_`|~1: ok\r\n\r\n")
            .unwrap();
        assert_eq!(headers.get("x!#$%&'*+-.^_`|~1"), "ok");
    }

    #[test]
    fn values_may_contain_colons() {
        let mut headers = Headers::new();
        headers.parse(b"Referer: http://a:8080/x\r\n\r\n").unwrap();
        assert_eq!(headers.get("referer"), "http://a:8080/x");
    }

    #[test]
    fn rejects_long_unterminated_line() {
        let mut data = b"X-Long: ".to_vec();
        data.extend(std::iter::repeat(b'a').take(MAX_LINE_BYTES + 1));
        let err = Headers::new().parse(&data).unwrap_err();
        assert_eq!(err, ParseError::HeaderLineTooLong { limit: MAX_LINE_BYTES });
    }

    #[test]
    fn rejects_long_terminated_line() {
        let mut data = b"X-Long: ".to_vec();
        data.extend(std::iter::repeat(b'a').take(MAX_LINE_BYTES));
        data.extend_from_slice(b"\r\n\r\n");
        let err = Headers::new().parse(&data).unwrap_err();
        assert_eq!(err, ParseError::HeaderLineTooLong { limit: MAX_LINE_BYTES });
    }

    #[test]
    fn honours_custom_limit() {
        let err = Headers::new()
            .parse_with_limit(b"Host: example.com\r\n\r\n", 10)
            .unwrap_err();
        assert_eq!(err, ParseError::HeaderLineTooLong { limit: 10 });
    }

    #[test]
    fn set_appends_and_override_replaces() {
        let mut headers = Headers::new();
        headers.set("Vary", "accept");
        headers.set("vary", "encoding");
        assert_eq!(headers.get("VARY"), "accept,encoding");

        headers.override_value("Vary", "origin");
        assert_eq!(headers.get("vary"), "origin");

        headers.delete("VARY");
        assert!(!headers.contains("vary"));
        assert!(headers.is_empty());
    }

    #[test]
    fn iterates_sorted() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/plain");
        headers.set("connection", "close");
        headers.set("Accept", "*/*");
        let names: Vec<_> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["accept", "connection", "content-type"]);
    }

    #[test]
    fn canonicalizes_names() {
        assert_eq!(canonical_name("content-type"), "Content-Type");
        assert_eq!(canonical_name("x-forwarded-for"), "X-Forwarded-For");
        assert_eq!(canonical_name("etag"), "Etag");
        assert_eq!(canonical_name("CONNECTION"), "Connection");
    }
}
