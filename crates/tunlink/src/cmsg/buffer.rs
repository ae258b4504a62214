//! Reusable control-message buffers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

use super::CONTROL_SIZE;

/// A control-message buffer with a fixed capacity and a current length.
///
/// The whole capacity window is handed to `recvmsg`; the kernel reports how
/// much it wrote and the caller records that with [`set_len`](Self::set_len).
/// On the send side records are appended and [`bytes`](Self::bytes) is
/// passed as `msg_control`.
#[derive(Debug, Clone)]
pub struct ControlBuffer {
    storage: Vec<u8>,
    len: usize,
}

impl ControlBuffer {
    /// Create an empty buffer with room for `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            len: 0,
        }
    }

    /// Create a buffer big enough for every record this crate reads or writes.
    pub fn recommended() -> Self {
        Self::new(CONTROL_SIZE)
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes currently holding records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no records are held.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity not yet holding records.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Grow the capacity to at least `min` bytes. Never shrinks.
    pub fn reserve(&mut self, min: usize) {
        if self.storage.len() < min {
            self.storage.resize(min, 0);
        }
    }

    /// The records held, for use as `msg_control` when sending.
    pub fn bytes(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// The whole capacity window, for use as `msg_control` when receiving.
    pub fn capacity_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// The unused tail of the buffer.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.len..]
    }

    /// Record how many bytes hold valid records.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.capacity() {
            return Err(Error::Capacity {
                requested: len,
                capacity: self.capacity(),
            });
        }
        self.len = len;
        Ok(())
    }

    /// Drop all records, keeping the capacity.
    pub fn clear(&mut self) {
        self.storage.fill(0);
        self.len = 0;
    }

    /// Replace the contents with `bytes`.
    ///
    /// Returns false, leaving the buffer untouched, if `bytes` exceeds the
    /// capacity.
    pub(crate) fn replace_with(&mut self, bytes: &[u8]) -> bool {
        let Some(slot) = self.storage.get_mut(..bytes.len()) else {
            return false;
        };
        slot.copy_from_slice(bytes);
        self.len = bytes.len();
        true
    }
}

impl Default for ControlBuffer {
    fn default() -> Self {
        Self::recommended()
    }
}

/// A pool of control buffers shared between I/O tasks.
///
/// Buffers are cleared when returned so no record leaks from one datagram
/// into the next.
#[derive(Debug)]
pub struct ControlPool {
    free: Mutex<Vec<ControlBuffer>>,
    capacity: usize,
}

impl ControlPool {
    /// Create a pool handing out buffers of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Capacity of the buffers this pool hands out.
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    /// Take a buffer, allocating one if none is idle.
    pub fn get(&self) -> ControlBuffer {
        self.lock()
            .pop()
            .unwrap_or_else(|| ControlBuffer::new(self.capacity))
    }

    /// Return a buffer to the pool.
    pub fn put(&self, mut buf: ControlBuffer) {
        buf.clear();
        buf.reserve(self.capacity);
        self.lock().push(buf);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ControlBuffer>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ControlPool {
    fn default() -> Self {
        Self::new(CONTROL_SIZE)
    }
}
