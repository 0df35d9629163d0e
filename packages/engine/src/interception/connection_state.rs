// packages/engine/src/interception/connection_state.rs
//! Per-descriptor buffering state
//!
//! One concurrent map keyed by descriptor, each entry behind its own lock.
//! Service of a connection may migrate between threads, so nothing here is
//! thread-local, and unrelated connections never contend on the same lock.

use bytes::BytesMut;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Opaque OS socket handle. Reused by the OS after close.
pub type Descriptor = i64;

/// Protocol seen on a connection so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolHint {
    #[default]
    Unknown,
    Http1,
    Http2,
    /// The last message was abandoned (e.g. oversized header block)
    NotApplicable,
}

/// Data direction relative to the instrumented application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Buffering state for one connection.
///
/// Read and write buffers are independent and never aliased.
#[derive(Debug, Default)]
pub struct ConnectionState {
    pending_read: Option<BytesMut>,
    pending_write: Option<BytesMut>,
    protocol_hint: ProtocolHint,
}

impl ConnectionState {
    pub fn pending(&self, direction: Direction) -> Option<&BytesMut> {
        match direction {
            Direction::Read => self.pending_read.as_ref(),
            Direction::Write => self.pending_write.as_ref(),
        }
    }

    pub fn pending_mut(&mut self, direction: Direction) -> Option<&mut BytesMut> {
        match direction {
            Direction::Read => self.pending_read.as_mut(),
            Direction::Write => self.pending_write.as_mut(),
        }
    }

    pub fn has_pending(&self, direction: Direction) -> bool {
        self.pending(direction).is_some()
    }

    /// Start buffering a new message, dropping anything left from an
    /// earlier one
    pub fn begin(&mut self, direction: Direction, fragment: &[u8]) {
        *self.slot(direction) = Some(BytesMut::from(fragment));
    }

    /// Take the pending buffer, leaving the direction in its start state
    pub fn take(&mut self, direction: Direction) -> Option<BytesMut> {
        self.slot(direction).take()
    }

    pub fn clear(&mut self, direction: Direction) {
        *self.slot(direction) = None;
    }

    pub fn protocol_hint(&self) -> ProtocolHint {
        self.protocol_hint
    }

    pub fn set_protocol_hint(&mut self, hint: ProtocolHint) {
        self.protocol_hint = hint;
    }

    fn slot(&mut self, direction: Direction) -> &mut Option<BytesMut> {
        match direction {
            Direction::Read => &mut self.pending_read,
            Direction::Write => &mut self.pending_write,
        }
    }
}

/// Shared state handle for one descriptor
pub type SharedState = Arc<Mutex<ConnectionState>>;

/// Concurrent descriptor → state map
#[derive(Debug, Default)]
pub struct ConnectionStore {
    states: DashMap<Descriptor, SharedState>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `fd`, if any. The map shard is released before returning.
    pub fn get(&self, fd: Descriptor) -> Option<SharedState> {
        self.states.get(&fd).map(|entry| Arc::clone(entry.value()))
    }

    /// State for `fd`, created on first use
    pub fn get_or_create(&self, fd: Descriptor) -> SharedState {
        if let Some(state) = self.get(fd) {
            return state;
        }
        Arc::clone(self.states.entry(fd).or_default().value())
    }

    /// Run `f` against existing state for `fd`
    pub fn with_state<R>(&self, fd: Descriptor, f: impl FnOnce(&mut ConnectionState) -> R) -> Option<R> {
        let state = self.get(fd)?;
        let mut guard = state.lock();
        Some(f(&mut guard))
    }

    /// Run `f` against the state for `fd`, creating it if needed
    pub fn with_state_or_create<R>(&self, fd: Descriptor, f: impl FnOnce(&mut ConnectionState) -> R) -> R {
        let state = self.get_or_create(fd);
        let mut guard = state.lock();
        f(&mut guard)
    }

    pub fn has_pending(&self, fd: Descriptor, direction: Direction) -> bool {
        self.with_state(fd, |state| state.has_pending(direction))
            .unwrap_or(false)
    }

    pub fn protocol_hint(&self, fd: Descriptor) -> ProtocolHint {
        self.with_state(fd, |state| state.protocol_hint())
            .unwrap_or_default()
    }

    pub fn contains(&self, fd: Descriptor) -> bool {
        self.states.contains_key(&fd)
    }

    /// Destroy all state for `fd`
    pub fn remove(&self, fd: Descriptor) -> bool {
        self.states.remove(&fd).is_some()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
