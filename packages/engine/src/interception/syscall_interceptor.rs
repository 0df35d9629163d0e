// packages/engine/src/interception/syscall_interceptor.rs
//! Preload launcher
//!
//! Locates the built interception library and computes the environment a
//! child process needs to load it before anything else:
//! - `LD_PRELOAD` on Linux, `DYLD_INSERT_LIBRARIES` on macOS
//! - `HOOKWIRE_CONFIG` pointing at an engine configuration file
//! - `HOOKWIRE__INTERCEPTION__…` overrides for individual settings

use crate::utils::config::{CONFIG_PATH_ENV, ENV_PREFIX};
use crate::utils::errors::{EngineError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the preload library on this platform
#[cfg(target_os = "linux")]
pub const LIBRARY_FILE_NAME: &str = "libhookwire_engine.so";
#[cfg(target_os = "macos")]
pub const LIBRARY_FILE_NAME: &str = "libhookwire_engine.dylib";
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub const LIBRARY_FILE_NAME: &str = "hookwire_engine";

/// Directories searched when no library path is given
const STANDARD_DIRS: &[&str] = &[
    "/usr/lib/hookwire",
    "/usr/local/lib/hookwire",
    "./target/release",
    "./target/debug",
];

/// Preload launcher configuration
#[derive(Debug, Clone, Default)]
pub struct PreloadConfig {
    /// Path to the preload library
    pub library_path: Option<PathBuf>,

    /// Engine configuration file handed to the child
    pub config_path: Option<PathBuf>,

    /// Headers supplied by the child's default header supplier
    pub static_headers: Vec<(String, String)>,

    /// Intercept plain read/write on every descriptor
    pub track_all_descriptors: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PreloadLauncher {
    config: PreloadConfig,
}

impl PreloadLauncher {
    pub fn new(config: PreloadConfig) -> Self {
        Self { config }
    }

    /// Environment variable the dynamic linker reads preload libraries from
    pub fn preload_var() -> Result<&'static str> {
        if cfg!(target_os = "linux") {
            Ok("LD_PRELOAD")
        } else if cfg!(target_os = "macos") {
            Ok("DYLD_INSERT_LIBRARIES")
        } else {
            Err(EngineError::UnsupportedPlatform(std::env::consts::OS.to_string()))
        }
    }

    /// Resolve the preload library.
    ///
    /// An explicit path must exist. Otherwise the standard locations are
    /// searched and `None` is returned when nothing is found.
    pub fn library_path(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.config.library_path {
            if path.exists() {
                debug!("Using preload library: {:?}", path);
                return Ok(Some(path.clone()));
            }
            return Err(EngineError::HookInstallationFailed(format!(
                "preload library not found: {:?}",
                path
            )));
        }

        for dir in STANDARD_DIRS {
            let candidate = Path::new(dir).join(LIBRARY_FILE_NAME);
            if candidate.exists() {
                debug!("Found preload library at: {:?}", candidate);
                return Ok(Some(candidate));
            }
        }

        warn!("No preload library found, interception disabled");
        Ok(None)
    }

    /// Whether a child process can be instrumented at all
    pub fn is_available(&self) -> bool {
        Self::preload_var().is_ok() && matches!(self.library_path(), Ok(Some(_)))
    }

    /// Environment variables for the child process
    pub fn env_vars(&self) -> Result<Vec<(String, String)>> {
        let var = Self::preload_var()?;
        let library = self.library_path()?.ok_or_else(|| {
            EngineError::HookInstallationFailed(format!("{} not found", LIBRARY_FILE_NAME))
        })?;

        let mut env_vars = vec![(var.to_string(), library.to_string_lossy().into_owned())];

        if let Some(config_path) = &self.config.config_path {
            if !config_path.exists() {
                return Err(EngineError::ConfigError(format!(
                    "config file not found: {}",
                    config_path.display()
                )));
            }
            env_vars.push((
                CONFIG_PATH_ENV.to_string(),
                config_path.to_string_lossy().into_owned(),
            ));
        }

        for (name, value) in &self.config.static_headers {
            env_vars.push((override_key(&["interception", "static_headers", name]), value.clone()));
        }

        if self.config.track_all_descriptors {
            env_vars.push((
                override_key(&["interception", "track_all_descriptors"]),
                "true".to_string(),
            ));
        }

        Ok(env_vars)
    }
}

/// `HOOKWIRE__A__B` style override key
fn override_key(path: &[&str]) -> String {
    let mut key = ENV_PREFIX.to_string();
    for segment in path {
        key.push_str("__");
        key.push_str(&segment.to_uppercase());
    }
    key
}

/// Parse a `NAME=VALUE` header argument
pub fn parse_header_arg(arg: &str) -> Result<(String, String)> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| EngineError::ConfigError(format!("expected NAME=VALUE, got {:?}", arg)))?;
    let name = name.trim();
    if name.is_empty() || name.contains(':') || name.contains(char::is_whitespace) {
        return Err(EngineError::ConfigError(format!("invalid header name: {:?}", name)));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
