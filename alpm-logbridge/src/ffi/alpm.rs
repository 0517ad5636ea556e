use std::ffi::{c_int, c_void};
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;

use super::{InstallTable, LogCallback, LogRegistry};
use crate::api::{BridgeError, BridgeOpts, ForeignHandler, ForeignLogHandler};
use crate::bridge::LogBridge;

/// Opaque `alpm_handle_t`.
#[allow(non_camel_case_types)]
#[repr(C)]
pub struct alpm_handle_t {
    _private: [u8; 0],
}

#[link(name = "alpm")]
extern "C" {
    fn alpm_option_set_logcb(
        handle: *mut alpm_handle_t,
        cb: Option<LogCallback>,
        ctx: *mut c_void,
    ) -> c_int;
}

/// Borrowed libalpm handle. Creating and releasing the handle is up to the
/// caller.
pub struct AlpmHandle {
    ptr: NonNull<alpm_handle_t>,
}

// SAFETY: the handle is only used to set the log callback, which libalpm
// allows from any thread while no transaction runs on it.
unsafe impl Send for AlpmHandle {}

impl AlpmHandle {
    /// # Safety
    ///
    /// `ptr` must be null or a handle returned by `alpm_initialize` that
    /// outlives the returned value.
    pub unsafe fn from_raw(ptr: *mut alpm_handle_t) -> Result<Self, BridgeError> {
        NonNull::new(ptr)
            .map(|ptr| AlpmHandle { ptr })
            .ok_or(BridgeError::NullHandle)
    }

    pub fn as_ptr(&self) -> *mut alpm_handle_t {
        self.ptr.as_ptr()
    }
}

impl LogRegistry for AlpmHandle {
    unsafe fn set_log_callback(
        &mut self,
        callback: Option<LogCallback>,
        ctx: *mut c_void,
    ) -> Result<(), BridgeError> {
        // SAFETY: the handle is valid per `from_raw`; ctx validity is the
        // caller's obligation.
        let status = unsafe { alpm_option_set_logcb(self.ptr.as_ptr(), callback, ctx) };
        if status != 0 {
            return Err(BridgeError::RegistrationFailed(status));
        }
        Ok(())
    }
}

static INSTALLED: Lazy<Mutex<InstallTable<AlpmHandle>>> =
    Lazy::new(|| Mutex::new(InstallTable::new()));

fn table_key(handle: u64) -> Result<usize, BridgeError> {
    usize::try_from(handle).map_err(|_| BridgeError::InvalidHandle(handle))
}

/// Routes libalpm log output of `handle` to `handler`. Calling again for the
/// same handle replaces the previous handler.
///
/// `handle` is the address of a live `alpm_handle_t`.
#[uniffi::export]
pub fn install_logging(
    handle: u64,
    handler: Box<dyn ForeignLogHandler>,
    opts: BridgeOpts,
) -> Result<(), BridgeError> {
    let key = table_key(handle)?;
    let bridge = LogBridge::with_opts(ForeignHandler::new(handler), opts)?;

    let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    installed.install(key, bridge, || {
        // SAFETY: the embedding passes the address of a live handle.
        unsafe { AlpmHandle::from_raw(key as *mut alpm_handle_t) }
    })
}

/// Clears the log callback of `handle`. Must be called before the handle is
/// released.
#[uniffi::export]
pub fn uninstall_logging(handle: u64) -> Result<(), BridgeError> {
    let key = table_key(handle)?;
    let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    installed.uninstall(key)
}
