// packages/engine/src/interception/callbacks.rs
//! Event callback bus
//!
//! Four replaceable slots, each defaulting to a no-op. Replacement is a
//! single atomic swap (last writer wins); invocation loads the current slot
//! without locking and runs inline on the intercepting thread, so every
//! callback must be fast and must not block.

use crate::interception::headers::HeaderMap;
use arc_swap::ArcSwap;
use std::sync::Arc;

pub type HeaderSupplier = Box<dyn Fn() -> HeaderMap + Send + Sync>;
pub type HeadersObserver = Box<dyn Fn(HeaderMap) + Send + Sync>;
pub type RawBytesObserver = Box<dyn Fn(&[u8]) + Send + Sync>;

pub struct CallbackBus {
    header_supplier: ArcSwap<HeaderSupplier>,
    headers_observed: ArcSwap<HeadersObserver>,
    raw_read: ArcSwap<RawBytesObserver>,
    raw_write: ArcSwap<RawBytesObserver>,
}

impl CallbackBus {
    /// Bus with every slot set to a no-op
    pub fn new() -> Self {
        Self {
            header_supplier: ArcSwap::from_pointee(Box::new(HeaderMap::new) as HeaderSupplier),
            headers_observed: ArcSwap::from_pointee(Box::new(|_: HeaderMap| {}) as HeadersObserver),
            raw_read: ArcSwap::from_pointee(Box::new(|_: &[u8]| {}) as RawBytesObserver),
            raw_write: ArcSwap::from_pointee(Box::new(|_: &[u8]| {}) as RawBytesObserver),
        }
    }

    /// Bus whose supplier hands out a fixed header set
    pub fn with_static_headers(headers: HeaderMap) -> Self {
        let bus = Self::new();
        if !headers.is_empty() {
            bus.set_header_supplier(move || headers.clone());
        }
        bus
    }

    pub fn set_header_supplier(&self, supplier: impl Fn() -> HeaderMap + Send + Sync + 'static) {
        let supplier: HeaderSupplier = Box::new(supplier);
        self.header_supplier.store(Arc::new(supplier));
    }

    pub fn set_headers_observer(&self, observer: impl Fn(HeaderMap) + Send + Sync + 'static) {
        let observer: HeadersObserver = Box::new(observer);
        self.headers_observed.store(Arc::new(observer));
    }

    pub fn set_raw_read_observer(&self, observer: impl Fn(&[u8]) + Send + Sync + 'static) {
        let observer: RawBytesObserver = Box::new(observer);
        self.raw_read.store(Arc::new(observer));
    }

    pub fn set_raw_write_observer(&self, observer: impl Fn(&[u8]) + Send + Sync + 'static) {
        let observer: RawBytesObserver = Box::new(observer);
        self.raw_write.store(Arc::new(observer));
    }

    /// Headers to inject. Called at injection time, never earlier.
    pub fn supplied_headers(&self) -> HeaderMap {
        let guard = self.header_supplier.load();
        let supplier: &HeaderSupplier = &guard;
        supplier()
    }

    pub fn headers_observed(&self, headers: HeaderMap) {
        let guard = self.headers_observed.load();
        let observer: &HeadersObserver = &guard;
        observer(headers)
    }

    pub fn raw_read(&self, bytes: &[u8]) {
        let guard = self.raw_read.load();
        let observer: &RawBytesObserver = &guard;
        observer(bytes)
    }

    pub fn raw_write(&self, bytes: &[u8]) {
        let guard = self.raw_write.load();
        let observer: &RawBytesObserver = &guard;
        observer(bytes)
    }
}

impl Default for CallbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBus").finish_non_exhaustive()
    }
}
