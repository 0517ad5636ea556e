//! Test doubles shared by the unit tests.

use std::ffi::c_void;
#[cfg(all(target_arch = "x86_64", not(windows)))]
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::{BridgeError, LogHandler, LogLevel};
use crate::buffer::{BufferAllocator, SystemAllocator};
use crate::ffi::{LogCallback, LogRegistry};
#[cfg(all(target_arch = "x86_64", not(windows)))]
use crate::render::native::tests::stack_va_list;

/// Allocator that counts live buffers and can be told to fail.
#[derive(Default)]
pub struct TrackingAllocator {
    live: AtomicUsize,
    allocations: AtomicUsize,
    grows: Mutex<Vec<usize>>,
    fail_allocate: AtomicBool,
    fail_grow: AtomicBool,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_allocate() -> Self {
        let allocator = Self::default();
        allocator.fail_allocate.store(true, Ordering::SeqCst);
        allocator
    }

    pub fn failing_grow() -> Self {
        let allocator = Self::default();
        allocator.fail_grow.store(true, Ordering::SeqCst);
        allocator
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn grows(&self) -> Vec<usize> {
        self.grows.lock().unwrap().clone()
    }
}

impl BufferAllocator for TrackingAllocator {
    fn allocate(&self, capacity: usize) -> Result<Vec<u8>, BridgeError> {
        if self.fail_allocate.load(Ordering::SeqCst) {
            return Err(BridgeError::AllocationFailed(capacity));
        }
        let bytes = SystemAllocator.allocate(capacity)?;
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(bytes)
    }

    fn grow(&self, bytes: &mut Vec<u8>, capacity: usize) -> Result<(), BridgeError> {
        if self.fail_grow.load(Ordering::SeqCst) {
            return Err(BridgeError::AllocationFailed(capacity));
        }
        SystemAllocator.grow(bytes, capacity)?;
        self.grows.lock().unwrap().push(capacity);
        Ok(())
    }

    fn release(&self, bytes: Vec<u8>) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        drop(bytes);
    }
}

/// Handler that keeps every message it is given.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(LogLevel, String)> {
        self.seen.lock().unwrap().clone()
    }
}

impl LogHandler for RecordingHandler {
    fn on_log(&self, level: LogLevel, message: &str) {
        self.seen.lock().unwrap().push((level, message.to_string()));
    }
}

/// Stands in for a libalpm handle.
#[derive(Default)]
pub struct FakeHandle {
    pub callback: Option<LogCallback>,
    pub ctx: usize,
    pub registrations: usize,
    pub fail_with: Option<i32>,
}

impl FakeHandle {
    /// Calls the registered callback the way libalpm would, with integer and
    /// pointer arguments in `slots`.
    #[cfg(all(target_arch = "x86_64", not(windows)))]
    pub fn emit(&self, level: u32, format: &str, slots: &mut [u64]) {
        let format = CString::new(format).unwrap();
        let mut tag = stack_va_list(slots);
        if let Some(callback) = self.callback {
            unsafe { callback(self.ctx as *mut c_void, level, format.as_ptr(), tag.as_va_list()) };
        }
    }
}

impl LogRegistry for FakeHandle {
    unsafe fn set_log_callback(
        &mut self,
        callback: Option<LogCallback>,
        ctx: *mut c_void,
    ) -> Result<(), BridgeError> {
        if let Some(status) = self.fail_with {
            return Err(BridgeError::RegistrationFailed(status));
        }
        self.callback = callback;
        self.ctx = ctx as usize;
        self.registrations += 1;
        Ok(())
    }
}
