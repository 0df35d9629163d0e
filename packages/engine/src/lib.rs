// packages/engine/src/lib.rs
//! Hookwire Interception Engine Library
//!
//! Observes and rewrites HTTP traffic at the raw socket I/O boundary of a
//! running process, without the cooperation of the libraries using those
//! sockets. Correlation headers supplied by an embedding agent are spliced
//! into outgoing header blocks; incoming header blocks are reported back.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **hook**: per-OS interposition of `read`/`write`/`send`/`recv`/… and
//!   the trampolines forwarding to the originals
//! - **interception**: registry, per-connection reassembly, HTTP/1.x header
//!   extraction and injection, callback bus
//! - **observability**: Tracing and metrics
//! - **utils**: Configuration and error types
//!
//! # Embedding
//!
//! ```no_run
//! use hookwire_engine::{hook, InterceptionConfig, InterceptionContext};
//!
//! let context = InterceptionContext::new(&InterceptionConfig::default());
//! context
//!     .callbacks()
//!     .set_header_supplier(|| [("X-Hookwire-Session", "abc")].into_iter().collect());
//! let context = hook::install(context)?;
//! context
//!     .callbacks()
//!     .set_headers_observer(|headers| println!("{:?}", headers));
//! # Ok::<(), hookwire_engine::EngineError>(())
//! ```

// Public module exports
pub mod hook;
pub mod interception;
pub mod observability;
pub mod utils;

// Re-export commonly used types
pub use interception::callbacks::CallbackBus;
pub use interception::context::InterceptionContext;
pub use interception::headers::HeaderMap;
pub use interception::registry::{Interceptor, InterceptorRegistry};
pub use interception::rewrite::RewriteResult;
pub use utils::config::{EngineConfig, InterceptionConfig};
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
