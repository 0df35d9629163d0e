// packages/engine/src/utils/mod.rs
//! Shared utilities: error taxonomy and configuration

pub mod config;
pub mod errors;

pub use config::{EngineConfig, InterceptionConfig, LoggingConfig};
pub use errors::{EngineError, Result};
