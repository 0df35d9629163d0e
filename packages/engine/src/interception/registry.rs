// packages/engine/src/interception/registry.rs
//! Interceptor trait and the ordered, write-once registry
//!
//! The registry is built before any interception begins and is immutable
//! afterwards, so concurrent dispatch needs no synchronization.

use crate::interception::callbacks::CallbackBus;
use crate::interception::connection_state::{ConnectionStore, Descriptor};
use crate::interception::headers::HeaderMap;
use crate::interception::protocol::peek;
use crate::interception::rewrite::RewriteResult;
use crate::utils::errors::Result;
use bytes::Bytes;

/// Shared engine resources handed to interceptors on every call
#[derive(Clone, Copy)]
pub struct Exchange<'a> {
    pub store: &'a ConnectionStore,
    pub callbacks: &'a CallbackBus,
}

/// A completed message seen on the read path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedMessage {
    pub headers: HeaderMap,
    /// Every byte buffered for the message, header block first
    pub raw: Bytes,
}

/// A protocol plugin
pub trait Interceptor: Send + Sync {
    /// Short name for logs and metrics
    fn name(&self) -> &'static str;

    /// Whether this interceptor owns the event. `prefix` holds at most the
    /// first eight bytes of the fragment.
    fn is_suitable(&self, exchange: &Exchange<'_>, fd: Descriptor, prefix: &[u8]) -> bool;

    /// Feed bytes the application just read
    fn on_read(
        &self,
        exchange: &Exchange<'_>,
        fd: Descriptor,
        bytes: &[u8],
    ) -> Result<Option<ObservedMessage>>;

    /// Inspect, and possibly rewrite, bytes the application is writing
    fn on_write(&self, exchange: &Exchange<'_>, fd: Descriptor, bytes: &[u8]) -> Result<RewriteResult>;

    /// The descriptor is being closed
    fn on_close(&self, exchange: &Exchange<'_>, fd: Descriptor);
}

/// Ordered collection of interceptors
pub struct InterceptorRegistry {
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl InterceptorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with no interceptors: everything passes through
    pub fn empty() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// First interceptor, in registration order, that claims the fragment
    pub fn select(&self, exchange: &Exchange<'_>, fd: Descriptor, bytes: &[u8]) -> Option<&dyn Interceptor> {
        let prefix = peek(bytes);
        self.interceptors
            .iter()
            .map(|interceptor| interceptor.as_ref())
            .find(|interceptor| interceptor.is_suitable(exchange, fd, prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Interceptor> {
        self.interceptors.iter().map(|interceptor| interceptor.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|interceptor| interceptor.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Append-only builder, consumed into an immutable registry
#[derive(Default)]
pub struct RegistryBuilder {
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl RegistryBuilder {
    pub fn register(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    pub fn build(self) -> InterceptorRegistry {
        InterceptorRegistry {
            interceptors: self.interceptors,
        }
    }
}
