// packages/engine/src/interception/http2_passthrough.rs
//! HTTP/2 preface detection
//!
//! Claims connections that open with the HTTP/2 client preface and keeps
//! claiming them afterwards, so binary frames never reach the HTTP/1.x
//! reassembler. Bytes are never buffered or modified.

use crate::interception::connection_state::{Descriptor, Direction, ProtocolHint};
use crate::interception::protocol::is_http2_preface;
use crate::interception::registry::{Exchange, Interceptor, ObservedMessage};
use crate::interception::rewrite::RewriteResult;
use crate::utils::errors::Result;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct Http2Passthrough;

impl Http2Passthrough {
    pub const NAME: &'static str = "http2-passthrough";

    fn observe(&self, exchange: &Exchange<'_>, fd: Descriptor, bytes: &[u8]) {
        if !is_http2_preface(bytes) {
            return;
        }
        exchange.store.with_state_or_create(fd, |state| {
            if state.protocol_hint() != ProtocolHint::Http2 {
                debug!(fd, "HTTP/2 preface seen, passing connection through");
                state.set_protocol_hint(ProtocolHint::Http2);
            }
        });
    }
}

impl Interceptor for Http2Passthrough {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_suitable(&self, exchange: &Exchange<'_>, fd: Descriptor, prefix: &[u8]) -> bool {
        if exchange.store.protocol_hint(fd) == ProtocolHint::Http2 {
            return true;
        }
        // "PRI" inside an unfinished HTTP/1.x header block is not a preface
        is_http2_preface(prefix)
            && !exchange.store.has_pending(fd, Direction::Read)
            && !exchange.store.has_pending(fd, Direction::Write)
    }

    fn on_read(&self, exchange: &Exchange<'_>, fd: Descriptor, bytes: &[u8]) -> Result<Option<ObservedMessage>> {
        self.observe(exchange, fd, bytes);
        Ok(None)
    }

    fn on_write(&self, exchange: &Exchange<'_>, fd: Descriptor, bytes: &[u8]) -> Result<RewriteResult> {
        self.observe(exchange, fd, bytes);
        Ok(RewriteResult::passthrough(bytes.len()))
    }

    // the connection store entry is dropped by the context
    fn on_close(&self, _exchange: &Exchange<'_>, _fd: Descriptor) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::callbacks::CallbackBus;
    use crate::interception::connection_state::ConnectionStore;
    use crate::interception::protocol::HTTP2_PREFACE;

    #[test]
    fn test_preface_claims_connection() {
        let store = ConnectionStore::new();
        let callbacks = CallbackBus::new();
        let exchange = Exchange { store: &store, callbacks: &callbacks };
        let passthrough = Http2Passthrough;

        assert!(passthrough.is_suitable(&exchange, 3, &HTTP2_PREFACE[..8]));
        assert!(!passthrough.is_suitable(&exchange, 3, b"\x00\x00\x12\x04\x00"));

        let result = passthrough.on_write(&exchange, 3, HTTP2_PREFACE).unwrap();
        assert!(!result.is_rewritten());
        assert_eq!(store.protocol_hint(3), ProtocolHint::Http2);

        // a SETTINGS frame after the preface stays claimed
        let frame = b"\x00\x00\x12\x04\x00\x00\x00\x00\x00";
        assert!(passthrough.is_suitable(&exchange, 3, frame));
        assert!(passthrough.on_read(&exchange, 3, frame).unwrap().is_none());
    }

    #[test]
    fn test_pending_http1_block_not_claimed() {
        let store = ConnectionStore::new();
        let callbacks = CallbackBus::new();
        let exchange = Exchange { store: &store, callbacks: &callbacks };
        store.with_state_or_create(5, |state| state.begin(Direction::Read, b"GET / HTTP/1.1\r\nX-A: "));

        assert!(!Http2Passthrough.is_suitable(&exchange, 5, b"PRI"));
        assert!(Http2Passthrough.is_suitable(&exchange, 6, b"PRI"));
    }

    #[test]
    fn test_ignores_private_verbs() {
        let store = ConnectionStore::new();
        let callbacks = CallbackBus::new();
        let exchange = Exchange { store: &store, callbacks: &callbacks };
        assert!(!Http2Passthrough.is_suitable(&exchange, 4, b"PRIVATE "));
    }
}
