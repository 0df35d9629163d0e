// packages/engine/src/interception/context.rs
//! Interception context
//!
//! The one owned object every trampoline works through: the interceptor
//! registry, the connection state store, the callback bus and the set of
//! descriptors known to be sockets. Dispatch never fails; every error is
//! degraded to passthrough here.

use crate::interception::callbacks::CallbackBus;
use crate::interception::connection_state::{ConnectionStore, Descriptor};
use crate::interception::headers::HeaderMap;
use crate::interception::http2_passthrough::Http2Passthrough;
use crate::interception::http_interceptor::HttpInterceptor;
use crate::interception::registry::{Exchange, InterceptorRegistry};
use crate::interception::rewrite::RewriteResult;
use crate::observability::metrics;
use crate::utils::config::InterceptionConfig;
use crate::utils::errors::EngineError;
use dashmap::DashSet;
use tracing::{debug, warn};

pub struct InterceptionContext {
    registry: InterceptorRegistry,
    store: ConnectionStore,
    callbacks: CallbackBus,
    sockets: DashSet<Descriptor>,
    track_all_descriptors: bool,
}

impl InterceptionContext {
    /// Build the standard registry from configuration: the HTTP/2 preface
    /// passthrough (when enabled) ahead of HTTP/1.x
    pub fn new(config: &InterceptionConfig) -> Self {
        let mut builder = InterceptorRegistry::builder();
        if config.http2_passthrough {
            builder = builder.register(Http2Passthrough);
        }
        let registry = builder.register(HttpInterceptor::new(config)).build();

        let headers: HeaderMap = config.static_headers.clone().into();
        let mut context = Self::with_registry(registry, CallbackBus::with_static_headers(headers));
        context.track_all_descriptors = config.track_all_descriptors;
        context
    }

    /// Context over a custom registry. Plain stream calls are only
    /// intercepted on descriptors reported through [`on_socket_opened`].
    ///
    /// [`on_socket_opened`]: Self::on_socket_opened
    pub fn with_registry(registry: InterceptorRegistry, callbacks: CallbackBus) -> Self {
        Self {
            registry,
            store: ConnectionStore::new(),
            callbacks,
            sockets: DashSet::new(),
            track_all_descriptors: false,
        }
    }

    pub fn track_all_descriptors(mut self, enabled: bool) -> Self {
        self.track_all_descriptors = enabled;
        self
    }

    pub fn callbacks(&self) -> &CallbackBus {
        &self.callbacks
    }

    pub fn store(&self) -> &ConnectionStore {
        &self.store
    }

    pub fn registry(&self) -> &InterceptorRegistry {
        &self.registry
    }

    fn exchange(&self) -> Exchange<'_> {
        Exchange {
            store: &self.store,
            callbacks: &self.callbacks,
        }
    }

    /// A descriptor came out of a successful `accept` or `connect`
    pub fn on_socket_opened(&self, fd: Descriptor) {
        if self.sockets.insert(fd) {
            debug!(fd, "tracking socket");
        }
    }

    pub fn is_tracked(&self, fd: Descriptor) -> bool {
        self.sockets.contains(&fd)
    }

    /// Whether plain `read`/`write` calls on `fd` go through the engine
    pub fn intercepts_stream(&self, fd: Descriptor) -> bool {
        self.track_all_descriptors || self.is_tracked(fd)
    }

    /// Whether a fragment starting with `prefix` is handed to an
    /// interceptor. Lets scatter/gather calls skip copying passthrough bytes.
    pub fn claims(&self, fd: Descriptor, prefix: &[u8]) -> bool {
        !prefix.is_empty() && self.registry.select(&self.exchange(), fd, prefix).is_some()
    }

    /// Bytes the application just read. Fires the headers-observed and
    /// raw-read callbacks once per completed message.
    pub fn on_read(&self, fd: Descriptor, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let exchange = self.exchange();
        let Some(interceptor) = self.registry.select(&exchange, fd, bytes) else {
            return;
        };

        match interceptor.on_read(&exchange, fd, bytes) {
            Ok(Some(message)) => {
                metrics::record_observed(interceptor.name());
                self.callbacks.headers_observed(message.headers);
                self.callbacks.raw_read(&message.raw);
            }
            Ok(None) => {}
            Err(e) => self.degrade(interceptor.name(), fd, &e),
        }
    }

    /// Bytes the application is about to write. Never fails: any error
    /// yields a passthrough of the original bytes.
    pub fn on_write(&self, fd: Descriptor, bytes: &[u8]) -> RewriteResult {
        let passthrough = RewriteResult::passthrough(bytes.len());
        if bytes.is_empty() {
            return passthrough;
        }
        let exchange = self.exchange();
        let Some(interceptor) = self.registry.select(&exchange, fd, bytes) else {
            return passthrough;
        };

        match interceptor.on_write(&exchange, fd, bytes) {
            Ok(result) => {
                if result.is_rewritten() {
                    metrics::record_injected(interceptor.name());
                    debug!(
                        fd,
                        interceptor = interceptor.name(),
                        delta = result.injected_delta(),
                        "headers injected"
                    );
                }
                if let Some(message) = result.completed_message() {
                    self.callbacks.raw_write(message);
                }
                result
            }
            Err(e) => {
                self.degrade(interceptor.name(), fd, &e);
                passthrough
            }
        }
    }

    /// The descriptor is being closed. Releases every piece of state held
    /// for it so a reused descriptor starts fresh.
    pub fn on_close(&self, fd: Descriptor) {
        let exchange = self.exchange();
        for interceptor in self.registry.iter() {
            interceptor.on_close(&exchange, fd);
        }
        self.store.remove(fd);
        if self.sockets.remove(&fd).is_some() {
            debug!(fd, "socket closed");
        }
    }

    fn degrade(&self, interceptor: &'static str, fd: Descriptor, error: &EngineError) {
        match error {
            EngineError::BufferOverflow { .. } => {
                metrics::record_overflow();
                warn!(fd, interceptor, %error, "header block abandoned, passing through");
            }
            _ => {
                metrics::record_parse_failure(interceptor);
                warn!(fd, interceptor, %error, "interception failed, passing through");
            }
        }
    }
}

impl std::fmt::Debug for InterceptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionContext")
            .field("registry", &self.registry)
            .field("connections", &self.store.len())
            .field("sockets", &self.sockets.len())
            .field("track_all_descriptors", &self.track_all_descriptors)
            .finish()
    }
}
