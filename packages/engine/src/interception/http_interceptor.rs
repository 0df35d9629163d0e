// packages/engine/src/interception/http_interceptor.rs
//! HTTP/1.x interceptor
//!
//! Detects request and status lines at the raw socket boundary, reassembles
//! header blocks split across any number of reads or writes, reports
//! completed read-side header blocks and splices supplied headers into
//! write-side header blocks.
//!
//! Per connection and per direction the interceptor is in one of two states:
//!
//! ```text
//!            start fragment, no terminator
//!   START ─────────────────────────────────▶ ACCUMULATING
//!     ▲  │                                        │  │
//!     │  └─ start fragment with terminator        │  └─ continuation, no terminator
//!     │     (complete immediately)                │     (append, stay)
//!     └───────────────────────────────────────────┘
//!        terminator found in combined buffer,
//!        or buffer exceeded the size cap
//! ```

use crate::interception::connection_state::{
    ConnectionState, ConnectionStore, Descriptor, Direction, ProtocolHint,
};
use crate::interception::headers::{extract_headers, render_lines, splice, HeaderMap};
use crate::interception::protocol::{
    self, classify, find_terminator, find_terminator_from, Classification, CRLF,
    HEADERS_TERMINATOR,
};
use crate::interception::registry::{Exchange, Interceptor, ObservedMessage};
use crate::interception::rewrite::RewriteResult;
use crate::observability::metrics;
use crate::utils::config::InterceptionConfig;
use crate::utils::errors::{EngineError, Result};
use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

/// How far a fragment moved its message along
#[derive(Debug)]
enum Progress {
    /// Not part of an HTTP/1.x header block
    Ignored,

    /// Buffered; the header block is still incomplete
    Buffering,

    /// The header block is complete
    Complete {
        /// Every byte of the message seen so far, the current fragment last
        message: Bytes,
        /// How many of those bytes came from earlier fragments
        consumed: usize,
        /// Offset of the terminator within `message`
        terminator: usize,
    },
}

/// HTTP/1.x header detector, extractor and injector
#[derive(Debug, Clone)]
pub struct HttpInterceptor {
    max_header_block_size: usize,
    marker_header: String,
    internal_header: Vec<u8>,
}

impl HttpInterceptor {
    pub const NAME: &'static str = "http1";

    /// Create an interceptor from the interception settings
    pub fn new(config: &InterceptionConfig) -> Self {
        Self {
            max_header_block_size: config.max_header_block_size,
            marker_header: config.marker_header.clone(),
            internal_header: config.internal_header.as_bytes().to_vec(),
        }
    }

    pub fn max_header_block_size(&self) -> usize {
        self.max_header_block_size
    }

    pub fn marker_header(&self) -> &str {
        &self.marker_header
    }

    /// Feed one fragment through the per-direction state machine
    fn advance(
        &self,
        store: &ConnectionStore,
        fd: Descriptor,
        direction: Direction,
        bytes: &[u8],
    ) -> Result<Progress> {
        // an unfinished header block takes every fragment up to its terminator,
        // whatever the fragment starts with
        let resumed = store
            .with_state(fd, |state| {
                state
                    .has_pending(direction)
                    .then(|| self.resume(state, fd, direction, bytes))
            })
            .flatten();
        if let Some(progress) = resumed {
            return progress;
        }

        match classify(bytes) {
            Classification::Http1 => {
                store.with_state_or_create(fd, |state| self.start(state, fd, direction, bytes))
            }
            // left untouched for the HTTP/2 passthrough
            Classification::Http2Preface | Classification::Unclassified => Ok(Progress::Ignored),
        }
    }

    /// A fragment opening a new message while nothing is pending
    fn start(
        &self,
        state: &mut ConnectionState,
        fd: Descriptor,
        direction: Direction,
        bytes: &[u8],
    ) -> Result<Progress> {
        state.set_protocol_hint(ProtocolHint::Http1);

        if let Some(terminator) = find_terminator(bytes) {
            state.clear(direction);
            return Ok(Progress::Complete {
                message: Bytes::copy_from_slice(bytes),
                consumed: 0,
                terminator,
            });
        }

        if bytes.len() > self.max_header_block_size {
            return Err(self.abandon(state, fd, direction, bytes.len()));
        }

        trace!(fd, ?direction, len = bytes.len(), "buffering header fragment");
        state.begin(direction, bytes);
        Ok(Progress::Buffering)
    }

    /// A fragment continuing a buffered message, if there is one
    fn resume(
        &self,
        state: &mut ConnectionState,
        fd: Descriptor,
        direction: Direction,
        bytes: &[u8],
    ) -> Result<Progress> {
        let (consumed, found, size) = match state.pending_mut(direction) {
            Some(pending) => {
                let consumed = pending.len();
                pending.extend_from_slice(bytes);
                (consumed, find_terminator_from(pending, consumed), pending.len())
            }
            None => return Ok(Progress::Ignored),
        };

        match found {
            Some(terminator) => {
                let message = state
                    .take(direction)
                    .map(BytesMut::freeze)
                    .unwrap_or_default();
                trace!(fd, ?direction, len = message.len(), "header block reassembled");
                Ok(Progress::Complete {
                    message,
                    consumed,
                    terminator,
                })
            }
            None if size > self.max_header_block_size => {
                Err(self.abandon(state, fd, direction, size))
            }
            None => Ok(Progress::Buffering),
        }
    }

    /// Release the buffer of an oversized header block. The rest of the
    /// message passes through untouched.
    fn abandon(
        &self,
        state: &mut ConnectionState,
        fd: Descriptor,
        direction: Direction,
        size: usize,
    ) -> EngineError {
        debug!(fd, ?direction, size, "abandoning oversized header block");
        state.clear(direction);
        state.set_protocol_hint(ProtocolHint::NotApplicable);
        EngineError::BufferOverflow {
            limit: self.max_header_block_size,
            size,
        }
    }

    fn is_internal(&self, block: &[u8]) -> bool {
        protocol::contains(block, &self.internal_header)
    }
}

/// First supplied header the block already carries. Its presence means the
/// message went through an injector before.
fn already_carried<'a>(existing: &HeaderMap, supplied: &'a HeaderMap) -> Option<&'a str> {
    supplied
        .iter()
        .map(|(name, _)| name)
        .find(|name| existing.contains_key(name))
}

impl Default for HttpInterceptor {
    fn default() -> Self {
        Self::new(&InterceptionConfig::default())
    }
}

impl Interceptor for HttpInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_suitable(&self, exchange: &Exchange<'_>, fd: Descriptor, prefix: &[u8]) -> bool {
        protocol::is_http_start(prefix)
            || exchange.store.has_pending(fd, Direction::Read)
            || exchange.store.has_pending(fd, Direction::Write)
    }

    fn on_read(
        &self,
        exchange: &Exchange<'_>,
        fd: Descriptor,
        bytes: &[u8],
    ) -> Result<Option<ObservedMessage>> {
        let (message, terminator) = match self.advance(exchange.store, fd, Direction::Read, bytes)? {
            Progress::Complete {
                message, terminator, ..
            } => (message, terminator),
            Progress::Ignored | Progress::Buffering => return Ok(None),
        };

        let block_end = terminator + HEADERS_TERMINATOR.len();
        if self.is_internal(&message[..block_end]) {
            trace!(fd, "skipping internal message");
            return Ok(None);
        }

        let headers = extract_headers(&message[..block_end])?;
        for (name, value) in headers.iter() {
            trace!(fd, header = name, value, "read header");
        }

        Ok(Some(ObservedMessage {
            headers,
            raw: message,
        }))
    }

    fn on_write(&self, exchange: &Exchange<'_>, fd: Descriptor, bytes: &[u8]) -> Result<RewriteResult> {
        let passthrough = RewriteResult::passthrough(bytes.len());

        let (message, consumed, terminator) =
            match self.advance(exchange.store, fd, Direction::Write, bytes)? {
                Progress::Complete {
                    message,
                    consumed,
                    terminator,
                } => (message, consumed, terminator),
                Progress::Ignored | Progress::Buffering => return Ok(passthrough),
            };

        let block = &message[..terminator + HEADERS_TERMINATOR.len()];
        if self.is_internal(block) {
            trace!(fd, "skipping internal message");
            return Ok(passthrough);
        }

        let existing = extract_headers(block)?;
        if existing.contains_key(&self.marker_header) {
            trace!(fd, marker = %self.marker_header, "message already marked");
            metrics::record_injection_skipped();
            return Ok(passthrough.with_completed(message));
        }

        let headers = exchange.callbacks.supplied_headers();
        if headers.is_empty() {
            return Ok(passthrough.with_completed(message));
        }

        if let Some(name) = already_carried(&existing, &headers) {
            trace!(fd, header = name, "message already carries a supplied header");
            metrics::record_injection_skipped();
            return Ok(passthrough.with_completed(message));
        }

        // after the first CRLF of the terminator, each line carrying its own CRLF
        let splice_at = terminator + CRLF.len();
        if splice_at < consumed {
            warn!(
                fd,
                splice_at, consumed, "injection point already written, skipping injection"
            );
            return Ok(passthrough.with_completed(message));
        }

        let lines = render_lines(&headers)?;
        let rewritten = splice(bytes, splice_at - consumed, &lines)?;
        for (name, value) in headers.iter() {
            trace!(fd, header = name, value, "injected header");
        }

        let mut completed = BytesMut::with_capacity(consumed + rewritten.len());
        completed.extend_from_slice(&message[..consumed]);
        completed.extend_from_slice(&rewritten);

        Ok(RewriteResult::rewritten(rewritten, bytes.len()).with_completed(completed.freeze()))
    }

    fn on_close(&self, exchange: &Exchange<'_>, fd: Descriptor) {
        exchange.store.with_state(fd, |state| {
            state.clear(Direction::Read);
            state.clear(Direction::Write);
        });
    }
}
