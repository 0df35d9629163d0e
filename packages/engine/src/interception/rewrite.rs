// packages/engine/src/interception/rewrite.rs
//! Write-path rewrite results and byte-count correction

use bytes::Bytes;

/// Outcome of a write interception.
///
/// A passthrough carries no buffer at all, so the caller's own bytes are
/// forwarded without a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    buffer: Option<Vec<u8>>,
    original_length: usize,
    completed: Option<Bytes>,
}

impl RewriteResult {
    /// Forward the original bytes unmodified
    pub fn passthrough(original_length: usize) -> Self {
        Self {
            buffer: None,
            original_length,
            completed: None,
        }
    }

    /// Forward `buffer` in place of `original_length` caller bytes
    pub fn rewritten(buffer: Vec<u8>, original_length: usize) -> Self {
        Self {
            buffer: Some(buffer),
            original_length,
            completed: None,
        }
    }

    /// Attach the completed header message this write finished
    pub fn with_completed(mut self, message: Bytes) -> Self {
        self.completed = Some(message);
        self
    }

    pub fn is_rewritten(&self) -> bool {
        self.buffer.is_some()
    }

    /// Bytes to hand to the real syscall
    pub fn final_buffer<'a>(&'a self, original: &'a [u8]) -> &'a [u8] {
        self.buffer.as_deref().unwrap_or(original)
    }

    pub fn final_length(&self) -> usize {
        self.buffer
            .as_ref()
            .map_or(self.original_length, |buffer| buffer.len())
    }

    pub fn original_length(&self) -> usize {
        self.original_length
    }

    /// `final_length - original_length`
    pub fn injected_delta(&self) -> isize {
        self.final_length() as isize - self.original_length as isize
    }

    pub fn completed_message(&self) -> Option<&Bytes> {
        self.completed.as_ref()
    }

    /// Byte count to report to the application for a real return value
    pub fn reported_count(&self, real_return: isize) -> isize {
        reported_count(real_return, self.original_length, self.injected_delta())
    }
}

/// Correct a real syscall return for injected bytes.
///
/// Errors (negative returns) pass through untouched. Otherwise the result
/// is `real_return - delta` clamped to `[0, original_length]`: a short write
/// that only covered part of the injected bytes reports zero bytes of the
/// caller's content written.
pub fn reported_count(real_return: isize, original_length: usize, delta: isize) -> isize {
    if real_return < 0 {
        return real_return;
    }
    real_return
        .saturating_sub(delta)
        .clamp(0, original_length as isize)
}
