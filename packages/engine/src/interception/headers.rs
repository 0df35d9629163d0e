// packages/engine/src/interception/headers.rs
//! Header extraction (read path) and injection (write path)
//!
//! Both operate on owned, bounds-checked byte slices. Raw pointers never
//! reach this module.

use crate::interception::protocol::{find_line_end, find_terminator, CRLF, HEADERS_TERMINATOR};
use crate::utils::errors::{EngineError, Result};
use std::collections::HashMap;
use std::fmt;

/// Header name to value mapping.
///
/// Names keep the case they were received or supplied with; lookups and
/// replacement compare names case-insensitively. Iteration follows
/// insertion order so rendered output is deterministic.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing one with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl From<HashMap<String, String>> for HeaderMap {
    fn from(map: HashMap<String, String>) -> Self {
        let mut entries: Vec<_> = map.into_iter().collect();
        entries.sort();
        entries.into_iter().collect()
    }
}

impl IntoIterator for HeaderMap {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Header lines accepted in one block
const MAX_HEADERS: usize = 128;

/// Parse the header lines of a completed header block.
///
/// `block` must contain the terminator; everything after it is ignored.
/// The request or status line is dropped and the lines after it go through
/// `httparse`. Values are trimmed; a later duplicate replaces an earlier one.
pub fn extract_headers(block: &[u8]) -> Result<HeaderMap> {
    let end = find_terminator(block)
        .ok_or_else(|| EngineError::ParseFailed("header block is not terminated".to_string()))?;
    let block = &block[..end + HEADERS_TERMINATOR.len()];

    // the terminator guarantees a CRLF
    let lines = find_line_end(block).map_or(block, |first| &block[first + CRLF.len()..]);

    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let parsed = match httparse::parse_headers(lines, &mut storage) {
        Ok(httparse::Status::Complete((_, parsed))) => parsed,
        Ok(httparse::Status::Partial) => {
            return Err(EngineError::ParseFailed("header lines end early".to_string()))
        }
        Err(e) => return Err(EngineError::ParseFailed(format!("malformed header line: {}", e))),
    };

    let mut headers = HeaderMap::new();
    for header in parsed {
        let value = std::str::from_utf8(header.value).map_err(|e| {
            EngineError::ParseFailed(format!("header {:?} is not UTF-8: {}", header.name, e))
        })?;
        headers.insert(header.name, value.trim());
    }

    Ok(headers)
}

/// Render headers as `name: value\r\n` lines.
///
/// Inserted right after the first CRLF of a terminator this produces the
/// same bytes as inserting `CRLF + lines joined by CRLF` before it.
pub fn render_lines(headers: &HeaderMap) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(headers.iter().map(|(k, v)| k.len() + v.len() + 4).sum());
    for (name, value) in headers.iter() {
        validate(name, value)?;
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(CRLF);
    }
    Ok(out)
}

/// Splice rendered lines into `fragment` at `offset`
pub fn splice(fragment: &[u8], offset: usize, lines: &[u8]) -> Result<Vec<u8>> {
    if offset > fragment.len() {
        return Err(EngineError::ParseFailed(format!(
            "splice offset {} outside fragment of {} bytes",
            offset,
            fragment.len()
        )));
    }
    let mut out = Vec::with_capacity(fragment.len() + lines.len());
    out.extend_from_slice(&fragment[..offset]);
    out.extend_from_slice(lines);
    out.extend_from_slice(&fragment[offset..]);
    Ok(out)
}

/// Inject `headers` into a complete header block held in one buffer
pub fn inject_headers(message: &[u8], headers: &HeaderMap) -> Result<Vec<u8>> {
    let terminator = find_terminator(message)
        .ok_or_else(|| EngineError::ParseFailed("header block is not terminated".to_string()))?;
    let lines = render_lines(headers)?;
    splice(message, terminator + CRLF.len(), &lines)
}

fn validate(name: &str, value: &str) -> Result<()> {
    let bad_name = name.is_empty()
        || name
            .bytes()
            .any(|b| b == b':' || b == b'\r' || b == b'\n' || b.is_ascii_whitespace());
    let bad_value = value.bytes().any(|b| b == b'\r' || b == b'\n');
    if bad_name || bad_value {
        return Err(EngineError::ParseFailed(format!(
            "refusing to inject malformed header {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_request() {
        let headers = extract_headers(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Host"), Some("x"));
    }

    #[test]
    fn test_extract_trims_and_splits_on_first_colon() {
        let block = b"HTTP/1.1 200 OK\r\nLocation:  http://a:8080/x \r\nX-Empty:\r\n\r\nbody";
        let headers = extract_headers(block).unwrap();
        assert_eq!(headers.get("location"), Some("http://a:8080/x"));
        assert_eq!(headers.get("X-Empty"), Some(""));
    }

    #[test]
    fn test_extract_later_duplicate_wins() {
        let headers = extract_headers(b"GET / HTTP/1.1\r\nX-A: 1\r\nx-a: 2\r\n\r\n").unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-A"), Some("2"));
    }

    #[test]
    fn test_extract_rejects_malformed_line() {
        let result = extract_headers(b"GET / HTTP/1.1\r\nnot a header\r\n\r\n");
        assert!(matches!(result, Err(EngineError::ParseFailed(_))));
    }

    #[test]
    fn test_extract_requires_terminator() {
        assert!(extract_headers(b"GET / HTTP/1.1\r\nHost: x\r\n").is_err());
    }

    #[test]
    fn test_extract_rejects_space_before_colon() {
        let result = extract_headers(b"GET / HTTP/1.1\r\nHost : x\r\n\r\n");
        assert!(matches!(result, Err(EngineError::ParseFailed(_))));
    }

    #[test]
    fn test_extract_without_header_lines() {
        let headers = extract_headers(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_extract_ignores_request_line_and_body() {
        let block = b"GET /x-hookwire-session: HTTP/1.1\r\nhost: x\r\n\r\nX-Body: 1\r\n";
        let headers = extract_headers(block).unwrap();
        assert!(headers.contains_key("HOST"));
        assert!(!headers.contains_key("X-Body"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_inject_before_terminator() {
        let message = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
        let headers: HeaderMap = [("X-Trace", "abc")].into_iter().collect();
        let out = inject_headers(message, &headers).unwrap();
        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nX-Trace: abc\r\n\r\nok".to_vec()
        );
        assert_eq!(out.len() - message.len(), 14);
    }

    #[test]
    fn test_render_rejects_line_breaks() {
        let headers: HeaderMap = [("X-A", "1\r\nX-Evil: 2")].into_iter().collect();
        assert!(render_lines(&headers).is_err());
        let headers: HeaderMap = [("Bad Name", "1")].into_iter().collect();
        assert!(render_lines(&headers).is_err());
    }

    #[test]
    fn test_header_map_replace_keeps_latest_case() {
        let mut map = HeaderMap::new();
        map.insert("x-id", "1");
        map.insert("X-Id", "2");
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().next(), Some(("X-Id", "2")));
        assert!(map.contains_key("X-ID"));
    }
}
