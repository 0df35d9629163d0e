// packages/engine/src/hook/mod.rs
//! Hook installer
//!
//! The hooked functions are exported by the preload library itself (symbol
//! interposition on Linux, an `__interpose` table on macOS), so they exist
//! from the moment the library is loaded. Installing makes an
//! [`InterceptionContext`] active; until then, and after [`uninstall`], every
//! hook forwards straight to the original function.
//!
//! ```text
//! application ── write(fd, buf) ──▶ preload::write
//!                                      │  trampoline::write_through
//!                                      │     └─ InterceptionContext::on_write
//!                                      ▼
//!                               real::RealFunctions.write
//! ```

#[cfg(unix)]
pub mod real;
#[cfg(unix)]
pub mod scatter;
#[cfg(unix)]
pub mod trampoline;

#[cfg(all(feature = "preload", any(target_os = "linux", target_os = "macos")))]
mod preload;

use crate::interception::context::InterceptionContext;
use crate::observability::metrics;
use crate::utils::errors::{EngineError, Result};
use arc_swap::ArcSwapOption;
use parking_lot::{const_mutex, Mutex};
use std::sync::Arc;
use tracing::{error, info};

static ACTIVE: ArcSwapOption<InterceptionContext> = ArcSwapOption::const_empty();
static INSTALL_LOCK: Mutex<()> = const_mutex(());

/// Activate interception with `context`.
///
/// Every original function is resolved first; if any is missing nothing is
/// activated and interception stays disabled for the process.
pub fn install(context: InterceptionContext) -> Result<Arc<InterceptionContext>> {
    let _lock = INSTALL_LOCK.lock();

    if ACTIVE.load().is_some() {
        return Err(EngineError::AlreadyInstalled);
    }

    if let Err(e) = resolve_originals() {
        metrics::record_install_failure();
        error!(error = %e, "Failed to install socket hooks, interception disabled");
        return Err(e);
    }

    let context = Arc::new(context);
    ACTIVE.store(Some(Arc::clone(&context)));
    info!(
        interceptors = ?context.registry().names(),
        "Socket hooks installed"
    );
    Ok(context)
}

/// Deactivate interception. Hooks keep forwarding to the originals.
pub fn uninstall() -> Result<()> {
    let _lock = INSTALL_LOCK.lock();
    match ACTIVE.swap(None) {
        Some(_) => {
            info!("Socket hooks uninstalled");
            Ok(())
        }
        None => Err(EngineError::NotInstalled),
    }
}

pub fn is_installed() -> bool {
    ACTIVE.load().is_some()
}

/// The active context, if any
pub fn context() -> Option<Arc<InterceptionContext>> {
    ACTIVE.load_full()
}

/// Lock-free view of the active context for the hot path
#[cfg(all(feature = "preload", any(target_os = "linux", target_os = "macos")))]
pub(crate) fn active() -> arc_swap::Guard<Option<Arc<InterceptionContext>>> {
    ACTIVE.load()
}

#[cfg(unix)]
fn resolve_originals() -> Result<()> {
    real::resolve().map(|_| ())
}

#[cfg(not(unix))]
fn resolve_originals() -> Result<()> {
    Err(EngineError::HookInstallationFailed(format!(
        "socket hooks are not supported on {}",
        std::env::consts::OS
    )))
}
