//! C ABI entry point handed to libalpm and the installer that registers it.

#[cfg(feature = "alpm")]
pub mod alpm;
mod table;

use std::ffi::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};

use log::error;
use va_list::VaList;

use crate::api::{BridgeError, LogLevel};
use crate::bridge::LogBridge;
use crate::render::native::NativeFormat;
use crate::render::Render;

pub use table::InstallTable;

/// `alpm_cb_log`
pub type LogCallback =
    unsafe extern "C" fn(ctx: *mut c_void, level: u32, format: *const c_char, args: VaList<'_>);

/// Log callback registration facility of a native library handle.
pub trait LogRegistry {
    /// Makes `callback` the active log callback, called with `ctx` as its
    /// first argument. `None` disables logging.
    ///
    /// # Safety
    ///
    /// `ctx` must stay valid for as long as `callback` remains registered.
    unsafe fn set_log_callback(
        &mut self,
        callback: Option<LogCallback>,
        ctx: *mut c_void,
    ) -> Result<(), BridgeError>;
}

/// Invoked by libalpm for every log event.
///
/// # Safety
///
/// `ctx` must be null or point to a live [`LogBridge`]. `format` and `args`
/// must satisfy the `vsnprintf(3)` contract.
pub unsafe extern "C" fn bridge_log_cb(
    ctx: *mut c_void,
    level: u32,
    format: *const c_char,
    args: VaList<'_>,
) {
    if ctx.is_null() || format.is_null() {
        return;
    }

    // SAFETY: ctx is the bridge installed by `LoggedHandle`, which outlives
    // the registration.
    let bridge = unsafe { &*(ctx as *const LogBridge) };
    // SAFETY: forwarded from libalpm unchanged.
    let mut message = unsafe { NativeFormat::new(format, args) };

    guarded_dispatch(bridge, LogLevel::from_raw(level), &mut message);
}

/// Runs [`LogBridge::dispatch`] so that no panic escapes, including one
/// raised by the process logger while reporting a handler panic.
pub fn guarded_dispatch<R: Render + ?Sized>(bridge: &LogBridge, level: LogLevel, message: &mut R) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        bridge.dispatch(level, message);
    }));

    if let Err(payload) = result {
        // Dropping an arbitrary payload may panic again.
        std::mem::forget(payload);

        let reported = panic::catch_unwind(|| {
            error!("Log handler panicked; message dropped");
        });
        if let Err(payload) = reported {
            std::mem::forget(payload);
        }
    }
}

/// A library handle together with the bridge its log callback points at.
pub struct LoggedHandle<R: LogRegistry> {
    registry: R,
    bridge: Option<Box<LogBridge>>,
}

impl<R: LogRegistry> LoggedHandle<R> {
    pub fn new(registry: R) -> Self {
        LoggedHandle {
            registry,
            bridge: None,
        }
    }

    /// Registers `bridge` as the handle's log callback, replacing any bridge
    /// installed earlier.
    pub fn install_logging(&mut self, bridge: LogBridge) -> Result<(), BridgeError> {
        let bridge = Box::new(bridge);
        let ctx = &*bridge as *const LogBridge as *mut c_void;

        // SAFETY: the box is stored in `self` below and kept until the
        // callback is replaced or cleared.
        unsafe { self.registry.set_log_callback(Some(bridge_log_cb), ctx)? };

        // The previous bridge is only released once nothing points at it.
        self.bridge = Some(bridge);
        Ok(())
    }

    pub fn uninstall_logging(&mut self) -> Result<(), BridgeError> {
        // SAFETY: clearing the callback never dereferences ctx.
        unsafe { self.registry.set_log_callback(None, std::ptr::null_mut())? };
        self.bridge = None;
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.bridge.is_some()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }
}

impl<R: LogRegistry> Drop for LoggedHandle<R> {
    fn drop(&mut self) {
        if self.bridge.is_some() {
            if let Err(e) = self.uninstall_logging() {
                // Keep the bridge alive rather than leave a dangling ctx.
                error!("Failed to clear log callback: {}", e);
                std::mem::forget(self.bridge.take());
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LogHandler;
    use crate::testing::{FakeHandle, RecordingHandler};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountedHandler {
        inner: RecordingHandler,
        drops: Arc<AtomicUsize>,
    }

    impl LogHandler for CountedHandler {
        fn on_log(&self, level: LogLevel, message: &str) {
            self.inner.on_log(level, message);
        }
    }

    impl Drop for CountedHandler {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl LogHandler for Panicking {
        fn on_log(&self, _: LogLevel, _: &str) {
            panic!("handler failure");
        }
    }

    #[test]
    fn test_reinstall_replaces_previous_bridge() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut handle = LoggedHandle::new(FakeHandle::default());

        handle
            .install_logging(LogBridge::new(CountedHandler {
                inner: RecordingHandler::new(),
                drops: drops.clone(),
            }))
            .unwrap();
        let first_ctx = handle.registry().ctx;
        handle
            .install_logging(LogBridge::new(CountedHandler {
                inner: RecordingHandler::new(),
                drops: drops.clone(),
            }))
            .unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(handle.registry().registrations, 2);
        assert_ne!(handle.registry().ctx, first_ctx);

        drop(handle);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registration_failure_keeps_previous_bridge() {
        let mut handle = LoggedHandle::new(FakeHandle::default());
        handle
            .install_logging(LogBridge::new(RecordingHandler::new()))
            .unwrap();
        let ctx = handle.registry().ctx;

        handle.registry_mut().fail_with = Some(-1);
        let result = handle.install_logging(LogBridge::new(RecordingHandler::new()));
        assert!(matches!(result, Err(BridgeError::RegistrationFailed(-1))));
        assert!(handle.is_installed());
        assert_eq!(handle.registry().ctx, ctx);

        handle.registry_mut().fail_with = None;
    }

    #[test]
    fn test_uninstall_clears_callback() {
        let mut handle = LoggedHandle::new(FakeHandle::default());
        handle
            .install_logging(LogBridge::new(RecordingHandler::new()))
            .unwrap();

        handle.uninstall_logging().unwrap();
        assert!(!handle.is_installed());
        assert!(handle.registry().callback.is_none());
        assert_eq!(handle.registry().ctx, 0);
    }

    #[test]
    fn test_guarded_dispatch_contains_handler_panic() {
        let bridge = LogBridge::new(Panicking);
        guarded_dispatch(&bridge, LogLevel::Error, &mut format_args!("boom"));

        let recorder = RecordingHandler::new();
        let bridge = LogBridge::new(recorder.clone());
        guarded_dispatch(&bridge, LogLevel::Warning, &mut format_args!("after {}", 1));
        assert_eq!(
            recorder.messages(),
            vec![(LogLevel::Warning, "after 1".to_string())]
        );
    }

    #[cfg(all(target_arch = "x86_64", not(windows)))]
    mod native {
        use super::*;
        use crate::api::{BridgeOpts, GrowthPolicy};
        use crate::render::native::tests::stack_va_list;
        use std::ffi::CString;

        #[test]
        fn test_installed_callback_formats_native_message() {
            let recorder = RecordingHandler::new();
            let mut handle = LoggedHandle::new(FakeHandle::default());
            handle
                .install_logging(LogBridge::new(recorder.clone()))
                .unwrap();

            let word = CString::new("full").unwrap();
            handle
                .registry()
                .emit(2, "disk %s at %d%%", &mut [word.as_ptr() as u64, 98]);

            assert_eq!(
                recorder.messages(),
                vec![(LogLevel::Warning, "disk full at 98%".to_string())]
            );
        }

        #[test]
        fn test_native_long_message_policies() {
            let long = CString::new("q".repeat(200)).unwrap();

            let recorder = RecordingHandler::new();
            let mut handle = LoggedHandle::new(FakeHandle::default());
            handle
                .install_logging(LogBridge::new(recorder.clone()))
                .unwrap();
            handle.registry().emit(4, "%s", &mut [long.as_ptr() as u64]);
            assert_eq!(recorder.messages()[0].1, "q".repeat(200));

            let recorder = RecordingHandler::new();
            let opts = BridgeOpts {
                growth: GrowthPolicy::GrowOnly,
                ..Default::default()
            };
            handle
                .install_logging(LogBridge::with_opts(recorder.clone(), opts).unwrap())
                .unwrap();
            handle.registry().emit(4, "%s", &mut [long.as_ptr() as u64]);
            assert_eq!(recorder.messages()[0].1, "q".repeat(127));
        }

        #[test]
        fn test_reinstalled_bridge_receives_messages() {
            let first = RecordingHandler::new();
            let second = RecordingHandler::new();
            let mut handle = LoggedHandle::new(FakeHandle::default());
            handle.install_logging(LogBridge::new(first.clone())).unwrap();
            handle.install_logging(LogBridge::new(second.clone())).unwrap();

            handle.registry().emit(1, "error: %s", &mut [c"boom".as_ptr() as u64]);
            assert!(first.messages().is_empty());
            assert_eq!(
                second.messages(),
                vec![(LogLevel::Error, "error: boom".to_string())]
            );
        }

        #[test]
        fn test_null_ctx_and_format_ignored() {
            let mut slots = [0u64];
            let mut tag = stack_va_list(&mut slots);
            unsafe {
                bridge_log_cb(std::ptr::null_mut(), 1, c"x".as_ptr(), tag.as_va_list());
            }

            let recorder = RecordingHandler::new();
            let bridge = LogBridge::new(recorder.clone());
            unsafe {
                bridge_log_cb(
                    &bridge as *const LogBridge as *mut c_void,
                    1,
                    std::ptr::null(),
                    tag.as_va_list(),
                );
            }
            assert!(recorder.messages().is_empty());
        }

        #[test]
        fn test_handler_panic_does_not_unwind() {
            let bridge = LogBridge::new(Panicking);
            let mut slots = [0u64];
            let mut tag = stack_va_list(&mut slots);
            unsafe {
                bridge_log_cb(
                    &bridge as *const LogBridge as *mut c_void,
                    1,
                    c"boom".as_ptr(),
                    tag.as_va_list(),
                );
            }
        }
    }
}
