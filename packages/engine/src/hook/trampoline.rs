// packages/engine/src/hook/trampoline.rs
//! Engine side of every hooked call
//!
//! Each function takes the original call as a closure, so the logic here
//! never touches raw pointers and can be exercised without hooking. No
//! panic escapes, `errno` set by the original call survives, and a socket
//! call issued while the engine already runs on the same thread (a log
//! line written to a socket, a callback doing I/O) is forwarded untouched.

use crate::hook::real;
use crate::hook::scatter::{self, Segments};
use crate::interception::connection_state::Descriptor;
use crate::interception::context::InterceptionContext;
use libc::{c_int, iovec};
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

thread_local! {
    static IN_ENGINE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running engine logic
pub struct ReentrancyGuard(());

impl ReentrancyGuard {
    pub fn enter() -> Option<Self> {
        IN_ENGINE
            .try_with(|flag| {
                if flag.get() {
                    None
                } else {
                    flag.set(true);
                    Some(ReentrancyGuard(()))
                }
            })
            .ok()
            .flatten()
    }

    pub fn is_active() -> bool {
        IN_ENGINE.try_with(Cell::get).unwrap_or(true)
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        let _ = IN_ENGINE.try_with(|flag| flag.set(false));
    }
}

/// Restores `errno` when dropped
struct ErrnoGuard(c_int);

impl ErrnoGuard {
    fn save() -> Self {
        Self(real::errno())
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        real::set_errno(self.0);
    }
}

/// Entry point family a call came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// `read`, `write`, `readv`, `writev`: any descriptor, files included
    Stream,
    /// `send`, `recv`: sockets only
    Socket,
}

fn engaged(context: &InterceptionContext, channel: Channel, fd: Descriptor) -> bool {
    match channel {
        Channel::Socket => true,
        Channel::Stream => context.intercepts_stream(fd),
    }
}

/// Run engine logic in isolation. `None` when re-entered or on panic.
pub fn guarded<R>(f: impl FnOnce() -> R) -> Option<R> {
    let _reentrancy = ReentrancyGuard::enter()?;
    let _errno = ErrnoGuard::save();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            error!("interception panicked, passing through");
            None
        }
    }
}

/// `write`/`send`: rewrite, forward, then correct the returned count
pub fn write_through(
    context: Option<&InterceptionContext>,
    channel: Channel,
    fd: Descriptor,
    data: &[u8],
    real: impl FnOnce(&[u8]) -> isize,
) -> isize {
    let rewrite = guarded(|| {
        context
            .filter(|cx| engaged(cx, channel, fd))
            .map(|cx| cx.on_write(fd, data))
    })
    .flatten();

    match rewrite {
        Some(result) if result.is_rewritten() => {
            let returned = real(result.final_buffer(data));
            result.reported_count(returned)
        }
        _ => real(data),
    }
}

/// `writev`: the segments are fed as one fragment. A rewrite goes out as a
/// single contiguous segment; the caller's array is never touched.
///
/// # Safety
/// Every iovec must describe readable memory.
pub unsafe fn writev_through(
    context: Option<&InterceptionContext>,
    fd: Descriptor,
    iovs: &[iovec],
    real: impl FnOnce(&[iovec]) -> isize,
) -> isize {
    let total = scatter::total_len(iovs);

    let rewrite = guarded(|| {
        context
            .filter(|cx| engaged(cx, Channel::Stream, fd))
            .filter(|cx| {
                let (prefix, len) = scatter::prefix(iovs, total);
                cx.claims(fd, &prefix[..len])
            })
            .map(|cx| {
                let data = scatter::gather(iovs, total);
                let result = cx.on_write(fd, &data);
                (data, result)
            })
    })
    .flatten();

    match rewrite {
        Some((data, result)) if result.is_rewritten() => {
            let segments = Segments::contiguous(result.final_buffer(&data));
            let returned = real(segments.as_slice());
            result.reported_count(returned)
        }
        _ => real(iovs),
    }
}

/// `read`/`recv`: feed the bytes the original call filled in
pub fn after_read(context: Option<&InterceptionContext>, channel: Channel, fd: Descriptor, filled: &[u8]) {
    if filled.is_empty() {
        return;
    }
    guarded(|| {
        if let Some(cx) = context.filter(|cx| engaged(cx, channel, fd)) {
            cx.on_read(fd, filled);
        }
    });
}

/// `readv`: gather the bytes read across segments, then feed them
///
/// # Safety
/// Every iovec must describe readable memory.
pub unsafe fn after_readv(context: Option<&InterceptionContext>, fd: Descriptor, iovs: &[iovec], filled: usize) {
    if filled == 0 {
        return;
    }
    guarded(|| {
        if let Some(cx) = context.filter(|cx| engaged(cx, Channel::Stream, fd)) {
            let (prefix, len) = scatter::prefix(iovs, filled);
            if !cx.claims(fd, &prefix[..len]) {
                return;
            }
            let bytes = scatter::gather(iovs, filled);
            cx.on_read(fd, &bytes);
        }
    });
}

/// `connect`/`accept` produced a socket
pub fn socket_opened(context: Option<&InterceptionContext>, fd: Descriptor) {
    guarded(|| {
        if let Some(cx) = context {
            cx.on_socket_opened(fd);
        }
    });
}

/// `close` is about to run; must be called before the original
pub fn closing(context: Option<&InterceptionContext>, fd: Descriptor) {
    guarded(|| {
        if let Some(cx) = context {
            cx.on_close(fd);
        }
    });
}
