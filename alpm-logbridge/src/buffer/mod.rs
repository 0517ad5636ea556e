use std::ffi::CStr;

use crate::api::BridgeError;

const GROWTH_ALIGN: usize = 16;

/// Capacity needed to hold a `required` byte message and its terminator,
/// rounded to a multiple of 16. `None` if that overflows.
pub fn grown_capacity(required: usize) -> Option<usize> {
    required
        .checked_add(GROWTH_ALIGN)
        .map(|n| n & !(GROWTH_ALIGN - 1))
}

/// Source of message buffers. Split out so allocation can be tracked and
/// made to fail in tests.
pub trait BufferAllocator: Send + Sync {
    /// Returns a zeroed buffer of exactly `capacity` bytes.
    fn allocate(&self, capacity: usize) -> Result<Vec<u8>, BridgeError>;

    /// Enlarges `bytes` to `capacity`, keeping its contents.
    fn grow(&self, bytes: &mut Vec<u8>, capacity: usize) -> Result<(), BridgeError>;

    fn release(&self, bytes: Vec<u8>) {
        drop(bytes);
    }
}

/// Heap allocator that reports out-of-memory instead of aborting.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

impl BufferAllocator for SystemAllocator {
    fn allocate(&self, capacity: usize) -> Result<Vec<u8>, BridgeError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| BridgeError::AllocationFailed(capacity))?;
        bytes.resize(capacity, 0);
        Ok(bytes)
    }

    fn grow(&self, bytes: &mut Vec<u8>, capacity: usize) -> Result<(), BridgeError> {
        if capacity <= bytes.len() {
            return Ok(());
        }

        bytes
            .try_reserve_exact(capacity - bytes.len())
            .map_err(|_| BridgeError::AllocationFailed(capacity))?;
        bytes.resize(capacity, 0);
        Ok(())
    }
}

/// Buffer owned by a single bridge invocation. Returned to its allocator
/// when dropped.
pub struct MessageBuffer<'a> {
    bytes: Vec<u8>,
    allocator: &'a dyn BufferAllocator,
}

impl<'a> MessageBuffer<'a> {
    pub fn allocate(
        allocator: &'a dyn BufferAllocator,
        capacity: usize,
    ) -> Result<Self, BridgeError> {
        let bytes = allocator.allocate(capacity)?;
        Ok(MessageBuffer { bytes, allocator })
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn grow(&mut self, capacity: usize) -> Result<(), BridgeError> {
        self.allocator.grow(&mut self.bytes, capacity)
    }

    /// Resets the contents to the empty string.
    pub fn clear(&mut self) {
        if let Some(first) = self.bytes.first_mut() {
            *first = 0;
        }
    }

    /// The message up to its terminator, or `None` if no terminator lies
    /// within the capacity.
    pub fn as_c_str(&self) -> Option<&CStr> {
        CStr::from_bytes_until_nul(&self.bytes).ok()
    }
}

impl Drop for MessageBuffer<'_> {
    fn drop(&mut self) {
        self.allocator.release(std::mem::take(&mut self.bytes));
    }
}
