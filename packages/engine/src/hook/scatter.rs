// packages/engine/src/hook/scatter.rs
//! Scatter/gather helpers for `readv`/`writev`
//!
//! The only place raw `iovec` pointers are turned into slices.

use crate::interception::protocol::DETECTOR_BYTES_COUNT;
use libc::{c_int, c_void, iovec};
use std::marker::PhantomData;

/// View the caller's iovec array.
///
/// # Safety
/// `iov` must point to `count` valid iovecs for the returned lifetime.
pub unsafe fn iovecs<'a>(iov: *const iovec, count: c_int) -> &'a [iovec] {
    if iov.is_null() || count <= 0 {
        return &[];
    }
    std::slice::from_raw_parts(iov, count as usize)
}

/// Bytes described by one iovec.
///
/// # Safety
/// The iovec must describe readable memory for the returned lifetime.
pub unsafe fn segment(iov: &iovec) -> &[u8] {
    if iov.iov_base.is_null() || iov.iov_len == 0 {
        return &[];
    }
    std::slice::from_raw_parts(iov.iov_base as *const u8, iov.iov_len)
}

pub fn total_len(iovs: &[iovec]) -> usize {
    iovs.iter()
        .map(|iov| iov.iov_len)
        .fold(0, usize::saturating_add)
}

/// Leading bytes of the first `filled` bytes across `iovs`, copied into a
/// fixed array so classification needs no allocation.
///
/// # Safety
/// Every iovec must describe readable memory.
pub unsafe fn prefix(iovs: &[iovec], filled: usize) -> ([u8; DETECTOR_BYTES_COUNT], usize) {
    let mut out = [0u8; DETECTOR_BYTES_COUNT];
    let limit = filled.min(DETECTOR_BYTES_COUNT);
    let mut len = 0;
    for iov in iovs {
        if len == limit {
            break;
        }
        let bytes = segment(iov);
        let take = bytes.len().min(limit - len);
        out[len..len + take].copy_from_slice(&bytes[..take]);
        len += take;
    }
    (out, len)
}

/// Copy the first `filled` bytes spread across `iovs`, in order.
///
/// # Safety
/// Every iovec must describe readable memory.
pub unsafe fn gather(iovs: &[iovec], filled: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(filled.min(total_len(iovs)));
    let mut remaining = filled;
    for iov in iovs {
        if remaining == 0 {
            break;
        }
        let bytes = segment(iov);
        let take = bytes.len().min(remaining);
        out.extend_from_slice(&bytes[..take]);
        remaining -= take;
    }
    out
}

/// Single-entry iovec array over a rewritten buffer, handed to the real
/// call in place of the caller's array
pub struct Segments<'a> {
    iovs: [iovec; 1],
    _buffer: PhantomData<&'a [u8]>,
}

impl<'a> Segments<'a> {
    pub fn contiguous(buffer: &'a [u8]) -> Self {
        Self {
            iovs: [iovec {
                iov_base: buffer.as_ptr() as *mut c_void,
                iov_len: buffer.len(),
            }],
            _buffer: PhantomData,
        }
    }

    pub fn as_slice(&self) -> &[iovec] {
        &self.iovs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iov(bytes: &[u8]) -> iovec {
        iovec {
            iov_base: bytes.as_ptr() as *mut c_void,
            iov_len: bytes.len(),
        }
    }

    #[test]
    fn test_gather_stops_at_filled() {
        let a = b"GET / ".to_vec();
        let b = b"HTTP/1.1\r\n".to_vec();
        let iovs = [iov(&a), iov(&b)];

        assert_eq!(total_len(&iovs), 16);
        assert_eq!(unsafe { gather(&iovs, 16) }, b"GET / HTTP/1.1\r\n");
        assert_eq!(unsafe { gather(&iovs, 8) }, b"GET / HT");
        assert_eq!(unsafe { gather(&iovs, 100) }.len(), 16);
    }

    #[test]
    fn test_prefix_spans_segments() {
        let a = b"GE".to_vec();
        let b = b"T / HTTP/1.1\r\n".to_vec();
        let iovs = [iov(&a), iov(&b)];

        let (prefix, len) = unsafe { super::prefix(&iovs, 16) };
        assert_eq!(&prefix[..len], b"GET / HT");
        let (prefix, len) = unsafe { super::prefix(&iovs, 3) };
        assert_eq!(&prefix[..len], b"GET");
        let (_, len) = unsafe { super::prefix(&iovs, 0) };
        assert_eq!(len, 0);
    }

    #[test]
    fn test_contiguous_points_at_buffer() {
        let buffer = b"HTTP/1.1 200 OK\r\nX-A: 1\r\n\r\nok".to_vec();
        let segments = Segments::contiguous(&buffer);
        assert_eq!(segments.as_slice().len(), 1);
        assert_eq!(unsafe { segment(&segments.as_slice()[0]) }, &buffer[..]);
    }

    #[test]
    fn test_null_array_is_empty() {
        assert!(unsafe { iovecs(std::ptr::null(), 3) }.is_empty());
        let one = [iov(b"x")];
        assert!(unsafe { iovecs(one.as_ptr(), 0) }.is_empty());
        assert_eq!(unsafe { iovecs(one.as_ptr(), 1) }.len(), 1);
    }
}
