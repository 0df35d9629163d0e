// packages/engine/src/utils/errors.rs
//! Engine error types
//!
//! None of these ever cross a trampoline boundary: the hook layer maps every
//! error to a passthrough of the caller's original bytes.

use thiserror::Error;

/// Engine result alias
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the interception engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A target function could not be located or patched. Fatal: the engine
    /// stays disabled for the whole process.
    #[error("hook installation failed: {0}")]
    HookInstallationFailed(String),

    #[error("hooks are already installed")]
    AlreadyInstalled,

    #[error("hooks are not installed")]
    NotInstalled,

    #[error("interception not supported on {0}")]
    UnsupportedPlatform(String),

    /// Per-message parse failure, degrades to passthrough
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// A header block grew past the accumulation cap
    #[error("header block of {size} bytes exceeds limit of {limit} bytes")]
    BufferOverflow { limit: usize, size: usize },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the error disables the engine for the process lifetime
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::HookInstallationFailed(_) | EngineError::UnsupportedPlatform(_)
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
