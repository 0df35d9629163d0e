// packages/engine/src/hook/preload.rs
//! Exported hooks and the library constructor
//!
//! Raw pointers become slices here and nowhere else. When an original
//! cannot be resolved a hook fails with `ENOSYS`.

use crate::hook::trampoline::{self, Channel};
use crate::hook::{active, real, scatter};
use crate::interception::connection_state::Descriptor;
use crate::interception::context::InterceptionContext;
use crate::observability::{init_metrics, init_tracing};
use crate::utils::config::EngineConfig;
use libc::{c_int, c_void, iovec, size_t, sockaddr, socklen_t, ssize_t};
use tracing::{error, warn};

macro_rules! original {
    ($name:ident) => {
        match real::get() {
            Some(real) => real.$name,
            None => {
                real::set_errno(libc::ENOSYS);
                return -1;
            }
        }
    };
}

unsafe fn bytes<'a>(buf: *const c_void, len: usize) -> &'a [u8] {
    if buf.is_null() || len == 0 {
        return &[];
    }
    std::slice::from_raw_parts(buf as *const u8, len)
}

unsafe fn read_hook(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    let read = original!(read);
    let filled = read(fd, buf, count);
    if filled > 0 {
        let cx = active();
        trampoline::after_read(cx.as_deref(), Channel::Stream, fd as Descriptor, bytes(buf, filled as usize));
    }
    filled
}

unsafe fn recv_hook(fd: c_int, buf: *mut c_void, len: size_t, flags: c_int) -> ssize_t {
    let recv = original!(recv);
    let filled = recv(fd, buf, len, flags);
    // MSG_PEEK leaves the bytes in the socket; they are seen again on the real read
    if filled > 0 && flags & libc::MSG_PEEK == 0 {
        let cx = active();
        trampoline::after_read(cx.as_deref(), Channel::Socket, fd as Descriptor, bytes(buf, filled as usize));
    }
    filled
}

unsafe fn readv_hook(fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
    let readv = original!(readv);
    let filled = readv(fd, iov, iovcnt);
    if filled > 0 {
        let cx = active();
        trampoline::after_readv(cx.as_deref(), fd as Descriptor, scatter::iovecs(iov, iovcnt), filled as usize);
    }
    filled
}

unsafe fn write_hook(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
    let write = original!(write);
    if buf.is_null() || count == 0 {
        return write(fd, buf, count);
    }
    let cx = active();
    trampoline::write_through(cx.as_deref(), Channel::Stream, fd as Descriptor, bytes(buf, count), |out| {
        write(fd, out.as_ptr() as *const c_void, out.len())
    })
}

unsafe fn send_hook(fd: c_int, buf: *const c_void, len: size_t, flags: c_int) -> ssize_t {
    let send = original!(send);
    if buf.is_null() || len == 0 {
        return send(fd, buf, len, flags);
    }
    let cx = active();
    trampoline::write_through(cx.as_deref(), Channel::Socket, fd as Descriptor, bytes(buf, len), |out| {
        send(fd, out.as_ptr() as *const c_void, out.len(), flags)
    })
}

unsafe fn writev_hook(fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
    let writev = original!(writev);
    let iovs = scatter::iovecs(iov, iovcnt);
    if iovs.is_empty() {
        return writev(fd, iov, iovcnt);
    }
    let cx = active();
    trampoline::writev_through(cx.as_deref(), fd as Descriptor, iovs, |segments| {
        writev(fd, segments.as_ptr(), segments.len() as c_int)
    })
}

unsafe fn connect_hook(fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
    let connect = original!(connect);
    let result = connect(fd, addr, len);
    if result == 0 || real::errno() == libc::EINPROGRESS {
        let cx = active();
        trampoline::socket_opened(cx.as_deref(), fd as Descriptor);
    }
    result
}

unsafe fn accept_hook(fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
    let accept = original!(accept);
    let accepted = accept(fd, addr, len);
    if accepted >= 0 {
        let cx = active();
        trampoline::socket_opened(cx.as_deref(), accepted as Descriptor);
    }
    accepted
}

#[cfg(target_os = "linux")]
unsafe fn accept4_hook(fd: c_int, addr: *mut sockaddr, len: *mut socklen_t, flags: c_int) -> c_int {
    let accept4 = original!(accept4);
    let accepted = accept4(fd, addr, len, flags);
    if accepted >= 0 {
        let cx = active();
        trampoline::socket_opened(cx.as_deref(), accepted as Descriptor);
    }
    accepted
}

unsafe fn close_hook(fd: c_int) -> c_int {
    let close = original!(close);
    {
        let cx = active();
        trampoline::closing(cx.as_deref(), fd as Descriptor);
    }
    close(fd)
}

#[cfg(target_os = "linux")]
mod exports {
    use super::*;

    #[no_mangle]
    pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
        read_hook(fd, buf, count)
    }

    #[no_mangle]
    pub unsafe extern "C" fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
        write_hook(fd, buf, count)
    }

    #[no_mangle]
    pub unsafe extern "C" fn readv(fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
        readv_hook(fd, iov, iovcnt)
    }

    #[no_mangle]
    pub unsafe extern "C" fn writev(fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
        writev_hook(fd, iov, iovcnt)
    }

    #[no_mangle]
    pub unsafe extern "C" fn send(fd: c_int, buf: *const c_void, len: size_t, flags: c_int) -> ssize_t {
        send_hook(fd, buf, len, flags)
    }

    #[no_mangle]
    pub unsafe extern "C" fn recv(fd: c_int, buf: *mut c_void, len: size_t, flags: c_int) -> ssize_t {
        recv_hook(fd, buf, len, flags)
    }

    #[no_mangle]
    pub unsafe extern "C" fn connect(fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
        connect_hook(fd, addr, len)
    }

    #[no_mangle]
    pub unsafe extern "C" fn accept(fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
        accept_hook(fd, addr, len)
    }

    #[no_mangle]
    pub unsafe extern "C" fn accept4(
        fd: c_int,
        addr: *mut sockaddr,
        len: *mut socklen_t,
        flags: c_int,
    ) -> c_int {
        accept4_hook(fd, addr, len, flags)
    }

    #[no_mangle]
    pub unsafe extern "C" fn close(fd: c_int) -> c_int {
        close_hook(fd)
    }

    #[link_section = ".init_array"]
    #[used]
    static INIT: extern "C" fn() = {
        extern "C" fn init() {
            super::bootstrap();
        }
        init
    };
}

#[cfg(target_os = "macos")]
mod interpose {
    use super::*;

    #[repr(C)]
    pub struct Interpose {
        pub new_func: *const (),
        pub old_func: *const (),
    }

    unsafe impl Sync for Interpose {}

    unsafe extern "C" fn hookwire_read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
        read_hook(fd, buf, count)
    }

    unsafe extern "C" fn hookwire_write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
        write_hook(fd, buf, count)
    }

    unsafe extern "C" fn hookwire_readv(fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
        readv_hook(fd, iov, iovcnt)
    }

    unsafe extern "C" fn hookwire_writev(fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
        writev_hook(fd, iov, iovcnt)
    }

    unsafe extern "C" fn hookwire_send(fd: c_int, buf: *const c_void, len: size_t, flags: c_int) -> ssize_t {
        send_hook(fd, buf, len, flags)
    }

    unsafe extern "C" fn hookwire_recv(fd: c_int, buf: *mut c_void, len: size_t, flags: c_int) -> ssize_t {
        recv_hook(fd, buf, len, flags)
    }

    unsafe extern "C" fn hookwire_connect(fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
        connect_hook(fd, addr, len)
    }

    unsafe extern "C" fn hookwire_accept(fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
        accept_hook(fd, addr, len)
    }

    unsafe extern "C" fn hookwire_close(fd: c_int) -> c_int {
        close_hook(fd)
    }

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_READ: Interpose = Interpose {
        new_func: hookwire_read as _,
        old_func: libc::read as _,
    };

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_WRITE: Interpose = Interpose {
        new_func: hookwire_write as _,
        old_func: libc::write as _,
    };

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_READV: Interpose = Interpose {
        new_func: hookwire_readv as _,
        old_func: libc::readv as _,
    };

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_WRITEV: Interpose = Interpose {
        new_func: hookwire_writev as _,
        old_func: libc::writev as _,
    };

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_SEND: Interpose = Interpose {
        new_func: hookwire_send as _,
        old_func: libc::send as _,
    };

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_RECV: Interpose = Interpose {
        new_func: hookwire_recv as _,
        old_func: libc::recv as _,
    };

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_CONNECT: Interpose = Interpose {
        new_func: hookwire_connect as _,
        old_func: libc::connect as _,
    };

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_ACCEPT: Interpose = Interpose {
        new_func: hookwire_accept as _,
        old_func: libc::accept as _,
    };

    #[link_section = "__DATA,__interpose"]
    #[used]
    static IT_CLOSE: Interpose = Interpose {
        new_func: hookwire_close as _,
        old_func: libc::close as _,
    };

    #[link_section = "__DATA,__mod_init_func"]
    #[used]
    static INIT: extern "C" fn() = {
        extern "C" fn init() {
            super::bootstrap();
        }
        init
    };
}

/// Load configuration, start logging and activate interception. Any
/// failure leaves the process running with interception disabled.
fn bootstrap() {
    let outcome = std::panic::catch_unwind(|| {
        let loaded = EngineConfig::load();
        let logging = loaded
            .as_ref()
            .map(|config| config.logging.clone())
            .unwrap_or_default();
        init_tracing(&logging);
        init_metrics();

        let config = match loaded {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Invalid configuration, interception disabled");
                return;
            }
        };

        match crate::hook::install(InterceptionContext::new(&config.interception)) {
            Ok(_) => {}
            Err(e) if e.is_fatal() => error!(error = %e, "Interception disabled"),
            // an embedding agent installed its own context first
            Err(e) => warn!(error = %e, "Preload context not installed"),
        }
    });

    if outcome.is_err() {
        error!("Engine bootstrap panicked, interception disabled");
    }
}
