// packages/engine/src/observability/mod.rs
//! Logging and metrics setup
//!
//! - **Logging**: `tracing` subscriber writing to stderr, human or JSON
//! - **Metrics**: counters describing interception outcomes; the embedding
//!   agent decides where they are exported

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::init_metrics;
