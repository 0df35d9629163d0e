// packages/engine/src/interception/mod.rs
//! Socket-level interception layer
//!
//! Everything here works on owned, bounds-checked byte slices and is
//! independent of how the calls were hooked:
//!
//! - **Registry**: ordered, write-once list of protocol interceptors
//! - **Context**: the single owned object trampolines dispatch through
//! - **Connection State**: per-descriptor read/write reassembly buffers
//! - **Protocol**: prefix classification and header-block boundaries
//! - **Headers**: extraction (read path) and injection (write path)
//! - **HTTP Interceptor**: HTTP/1.x detector, reassembler and injector
//! - **HTTP/2 Passthrough**: preface detection, connection left untouched
//! - **Callbacks**: header supplier and observers set by the embedding agent
//! - **Syscall Interceptor**: environment for launching preloaded children
//!
//! # Architecture
//!
//! ```text
//! hooked syscall
//!     │
//!     └─ InterceptionContext
//!          ├─ InterceptorRegistry::select (first suitable, by prefix or state)
//!          │    ├─ Http2Passthrough
//!          │    └─ HttpInterceptor ─ ConnectionStore ─ headers
//!          └─ CallbackBus (supplier, headers observed, raw read/write)
//! ```

pub mod callbacks;
pub mod connection_state;
pub mod context;
pub mod headers;
pub mod http2_passthrough;
pub mod http_interceptor;
pub mod protocol;
pub mod registry;
pub mod rewrite;
pub mod syscall_interceptor;

// Re-export commonly used types
pub use callbacks::CallbackBus;
pub use connection_state::{ConnectionState, ConnectionStore, Descriptor, Direction, ProtocolHint};
pub use context::InterceptionContext;
pub use headers::HeaderMap;
pub use http2_passthrough::Http2Passthrough;
pub use http_interceptor::HttpInterceptor;
pub use registry::{Exchange, Interceptor, InterceptorRegistry, ObservedMessage, RegistryBuilder};
pub use rewrite::RewriteResult;
pub use syscall_interceptor::{PreloadConfig, PreloadLauncher};
