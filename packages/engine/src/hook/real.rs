// packages/engine/src/hook/real.rs
//! Original socket entry points
//!
//! Linux resolves the next definition of each symbol after the preloaded
//! image with `dlsym(RTLD_NEXT, …)`. On macOS references from the
//! interposing image itself are never interposed, so the libSystem symbols
//! are the originals. Every symbol is resolved before anything is
//! activated; a missing one fails the whole set.

use crate::utils::errors::{EngineError, Result};
use libc::{c_int, c_void, iovec, size_t, sockaddr, socklen_t, ssize_t};
use once_cell::sync::OnceCell;

pub type ReadFn = unsafe extern "C" fn(c_int, *mut c_void, size_t) -> ssize_t;
pub type WriteFn = unsafe extern "C" fn(c_int, *const c_void, size_t) -> ssize_t;
pub type ReadvFn = unsafe extern "C" fn(c_int, *const iovec, c_int) -> ssize_t;
pub type WritevFn = unsafe extern "C" fn(c_int, *const iovec, c_int) -> ssize_t;
pub type SendFn = unsafe extern "C" fn(c_int, *const c_void, size_t, c_int) -> ssize_t;
pub type RecvFn = unsafe extern "C" fn(c_int, *mut c_void, size_t, c_int) -> ssize_t;
pub type ConnectFn = unsafe extern "C" fn(c_int, *const sockaddr, socklen_t) -> c_int;
pub type AcceptFn = unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t) -> c_int;
#[cfg(target_os = "linux")]
pub type Accept4Fn = unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t, c_int) -> c_int;
pub type CloseFn = unsafe extern "C" fn(c_int) -> c_int;

/// Callable originals of every hooked function
#[derive(Clone, Copy)]
pub struct RealFunctions {
    pub read: ReadFn,
    pub write: WriteFn,
    pub readv: ReadvFn,
    pub writev: WritevFn,
    pub send: SendFn,
    pub recv: RecvFn,
    pub connect: ConnectFn,
    pub accept: AcceptFn,
    #[cfg(target_os = "linux")]
    pub accept4: Accept4Fn,
    pub close: CloseFn,
}

static REAL: OnceCell<RealFunctions> = OnceCell::new();

/// Resolve the originals once per process
pub fn resolve() -> Result<&'static RealFunctions> {
    REAL.get_or_try_init(RealFunctions::load)
}

/// Originals, resolving them on first use. `None` if resolution failed.
#[inline]
pub fn get() -> Option<&'static RealFunctions> {
    match REAL.get() {
        Some(real) => Some(real),
        None => resolve().ok(),
    }
}

#[cfg(target_os = "linux")]
macro_rules! next_symbol {
    ($name:literal, $ty:ty) => {{
        let symbol = unsafe {
            libc::dlsym(
                libc::RTLD_NEXT,
                concat!($name, "\0").as_ptr() as *const libc::c_char,
            )
        };
        if symbol.is_null() {
            return Err(EngineError::HookInstallationFailed(format!(
                "original `{}` not found",
                $name
            )));
        }
        unsafe { std::mem::transmute::<*mut c_void, $ty>(symbol) }
    }};
}

impl RealFunctions {
    #[cfg(target_os = "linux")]
    fn load() -> Result<Self> {
        Ok(Self {
            read: next_symbol!("read", ReadFn),
            write: next_symbol!("write", WriteFn),
            readv: next_symbol!("readv", ReadvFn),
            writev: next_symbol!("writev", WritevFn),
            send: next_symbol!("send", SendFn),
            recv: next_symbol!("recv", RecvFn),
            connect: next_symbol!("connect", ConnectFn),
            accept: next_symbol!("accept", AcceptFn),
            accept4: next_symbol!("accept4", Accept4Fn),
            close: next_symbol!("close", CloseFn),
        })
    }

    #[cfg(target_os = "macos")]
    fn load() -> Result<Self> {
        Ok(Self {
            read: libc::read,
            write: libc::write,
            readv: libc::readv,
            writev: libc::writev,
            send: libc::send,
            recv: libc::recv,
            connect: libc::connect,
            accept: libc::accept,
            close: libc::close,
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn load() -> Result<Self> {
        Err(EngineError::UnsupportedPlatform(std::env::consts::OS.to_string()))
    }
}

impl std::fmt::Debug for RealFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealFunctions")
            .field("read", &(self.read as *const ()))
            .field("write", &(self.write as *const ()))
            .field("close", &(self.close as *const ()))
            .finish_non_exhaustive()
    }
}

#[cfg(target_os = "linux")]
pub fn errno() -> c_int {
    unsafe { *libc::__errno_location() }
}

#[cfg(target_os = "linux")]
pub fn set_errno(value: c_int) {
    unsafe { *libc::__errno_location() = value }
}

#[cfg(target_os = "macos")]
pub fn errno() -> c_int {
    unsafe { *libc::__error() }
}

#[cfg(target_os = "macos")]
pub fn set_errno(value: c_int) {
    unsafe { *libc::__error() = value }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn set_errno(_value: c_int) {}
