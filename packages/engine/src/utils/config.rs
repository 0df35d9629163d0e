// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Sources are layered: built-in defaults, then an optional file named by
//! `HOOKWIRE_CONFIG`, then `HOOKWIRE__SECTION__KEY` environment variables.

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "HOOKWIRE_CONFIG";

/// Prefix of per-key environment overrides
pub const ENV_PREFIX: &str = "HOOKWIRE";

/// Default cap on a buffered header block (64 KiB)
pub const DEFAULT_MAX_HEADER_BLOCK_SIZE: usize = 64 * 1024;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub interception: InterceptionConfig,
    pub logging: LoggingConfig,
}

/// Interception behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptionConfig {
    /// Largest header block buffered across fragments before giving up
    pub max_header_block_size: usize,

    /// Header whose presence means "already injected"
    pub marker_header: String,

    /// Header line carried by the agent's own traffic
    pub internal_header: String,

    /// Detect the HTTP/2 preface and leave those connections alone
    pub http2_passthrough: bool,

    /// Intercept plain read/write on every descriptor, not only on
    /// descriptors seen in accept/connect
    pub track_all_descriptors: bool,

    /// Headers handed out by the default supplier
    pub static_headers: HashMap<String, String>,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            max_header_block_size: DEFAULT_MAX_HEADER_BLOCK_SIZE,
            marker_header: "X-Hookwire-Session".to_string(),
            internal_header: "x-hookwire-internal: true".to_string(),
            http2_passthrough: true,
            track_all_descriptors: false,
            static_headers: HashMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Emit JSON lines instead of the human format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the file named by `HOOKWIRE_CONFIG` (if any)
    /// and environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration from an explicit file plus environment overrides
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(EngineError::ConfigError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        let interception = &self.interception;

        if interception.max_header_block_size == 0 {
            return Err(EngineError::ConfigError(
                "max_header_block_size must be greater than zero".to_string(),
            ));
        }

        if interception.marker_header.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "marker_header must not be empty".to_string(),
            ));
        }

        if has_line_break(&interception.marker_header)
            || has_line_break(&interception.internal_header)
        {
            return Err(EngineError::ConfigError(
                "marker and internal headers must be single lines".to_string(),
            ));
        }

        for (name, value) in &interception.static_headers {
            if name.trim().is_empty() || name.contains(':') {
                return Err(EngineError::ConfigError(format!(
                    "invalid header name: {:?}",
                    name
                )));
            }
            if has_line_break(name) || has_line_break(value) {
                return Err(EngineError::ConfigError(format!(
                    "header {:?} contains a line break",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains('\r') || s.contains('\n')
}
