// packages/engine/src/interception/protocol.rs
//! Byte-prefix protocol classification and header-block boundaries

use memchr::memmem;

/// Number of leading bytes inspected to classify a fragment
pub const DETECTOR_BYTES_COUNT: usize = 8;

/// End of an HTTP/1.x header block
pub const HEADERS_TERMINATOR: &[u8] = b"\r\n\r\n";

pub const CRLF: &[u8] = b"\r\n";

/// Marker opening an HTTP/1.x response
pub const HTTP_RESPONSE_MARKER: &[u8] = b"HTTP";

/// HTTP/2 client connection preface
pub const HTTP2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Prefixes marking the start of an HTTP message (ASCII, case-sensitive)
pub const HTTP_PREFIXES: &[&[u8]] = &[
    b"OPTIONS",
    b"GET",
    b"HEAD",
    b"POST",
    b"PUT",
    b"PATCH",
    b"DELETE",
    b"TRACE",
    b"CONNECT",
    b"PRI",
    HTTP_RESPONSE_MARKER,
];

/// What a fragment's leading bytes look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Request line or status line of an HTTP/1.x message
    Http1,

    /// Start of the HTTP/2 preface
    Http2Preface,

    /// Anything else, including continuation bytes
    Unclassified,
}

/// The first [`DETECTOR_BYTES_COUNT`] bytes of a fragment, without copying
#[inline]
pub fn peek(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(DETECTOR_BYTES_COUNT)]
}

/// Classify a fragment by its prefix
pub fn classify(bytes: &[u8]) -> Classification {
    let prefix = peek(bytes);

    if prefix.starts_with(b"PRI") {
        return Classification::Http2Preface;
    }

    if HTTP_PREFIXES.iter().any(|marker| prefix.starts_with(marker)) {
        Classification::Http1
    } else {
        Classification::Unclassified
    }
}

/// Whether the prefix starts any HTTP message, the HTTP/2 preface included
#[inline]
pub fn is_http_start(bytes: &[u8]) -> bool {
    classify(bytes) != Classification::Unclassified
}

/// Whether the prefix is consistent with the HTTP/2 preface
#[inline]
pub fn is_http2_preface(bytes: &[u8]) -> bool {
    let prefix = peek(bytes);
    prefix.len() >= 3 && HTTP2_PREFACE.starts_with(prefix)
}

/// Offset of the first `\r\n\r\n`, if any
#[inline]
pub fn find_terminator(bytes: &[u8]) -> Option<usize> {
    memmem::find(bytes, HEADERS_TERMINATOR)
}

/// Offset of the first terminator that ends at or after `from`.
///
/// Used after appending a fragment to a pending buffer: only the tail of
/// the old bytes can take part in a terminator spanning the boundary.
#[inline]
pub fn find_terminator_from(bytes: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(HEADERS_TERMINATOR.len() - 1);
    find_terminator(&bytes[start..]).map(|offset| start + offset)
}

/// Offset of the first CRLF, the end of the request or status line
#[inline]
pub fn find_line_end(bytes: &[u8]) -> Option<usize> {
    memmem::find(bytes, CRLF)
}

#[inline]
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && memmem::find(haystack, needle).is_some()
}
