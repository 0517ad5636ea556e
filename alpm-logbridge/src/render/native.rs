//! printf-style formats coming from C, rendered with the C library's
//! `vsnprintf`.
//!
//! `vsnprintf` consumes the argument list it is given. On x86_64 System V
//! targets `va_list` is a pointer to a single tag struct and `va_copy` is a
//! plain copy of that struct, so each render works on a fresh copy and the
//! message can be rendered again after the buffer grows. Everywhere else the
//! argument list is handed over once and a second render is refused.

use std::ffi::{c_char, c_int};

use va_list::VaList;

use super::Render;

extern "C" {
    fn vsnprintf(s: *mut c_char, n: usize, format: *const c_char, ap: VaList) -> c_int;
}

#[cfg(all(target_arch = "x86_64", not(windows)))]
pub use self::sysv::VaListTag;

#[cfg(all(target_arch = "x86_64", not(windows)))]
mod sysv {
    use std::ffi::c_void;

    use va_list::VaList;

    /// `__va_list_tag` from the x86_64 System V ABI.
    #[repr(C)]
    #[derive(Clone, Copy, Debug)]
    pub struct VaListTag {
        pub gp_offset: u32,
        pub fp_offset: u32,
        pub overflow_arg_area: *mut c_void,
        pub reg_save_area: *mut c_void,
    }

    impl VaListTag {
        /// Borrows the tag as the `va_list` a C callee would receive.
        ///
        /// # Safety
        ///
        /// The tag must describe readable argument storage.
        pub unsafe fn as_va_list(&mut self) -> VaList<'_> {
            // SAFETY: on this ABI a `va_list` argument is a pointer to the tag.
            unsafe { std::mem::transmute::<*mut VaListTag, VaList<'_>>(self as *mut VaListTag) }
        }
    }

    /// The tag `args` points at.
    ///
    /// # Safety
    ///
    /// `args` must be a live `va_list` received as a function argument.
    pub(super) unsafe fn tag_of(args: &VaList<'_>) -> VaListTag {
        // SAFETY: a `va_list` argument is a single pointer to its tag.
        let tag = unsafe { std::mem::transmute_copy::<VaList<'_>, *const VaListTag>(args) };
        // SAFETY: the tag is live per the caller's contract.
        unsafe { *tag }
    }
}

pub struct NativeFormat<'a> {
    format: *const c_char,
    args: Option<VaList<'a>>,
}

impl<'a> NativeFormat<'a> {
    /// # Safety
    ///
    /// `format` must be null or a NUL-terminated printf format, and `args`
    /// must hold arguments matching it.
    pub unsafe fn new(format: *const c_char, args: VaList<'a>) -> Self {
        NativeFormat {
            format,
            args: Some(args),
        }
    }
}

impl Render for NativeFormat<'_> {
    #[cfg(all(target_arch = "x86_64", not(windows)))]
    fn render(&mut self, buf: &mut [u8]) -> Option<usize> {
        let args = self.args.as_ref()?;
        if self.format.is_null() || buf.is_empty() {
            return None;
        }

        // SAFETY: `args` came from a C caller per `new`'s contract.
        let mut copy = unsafe { sysv::tag_of(args) };
        // SAFETY: `buf` is writable for `buf.len()` bytes, `format` and the
        // copied argument list are valid per `new`'s contract.
        let n = unsafe {
            vsnprintf(
                buf.as_mut_ptr().cast(),
                buf.len(),
                self.format,
                copy.as_va_list(),
            )
        };

        usize::try_from(n).ok()
    }

    #[cfg(not(all(target_arch = "x86_64", not(windows))))]
    fn render(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.format.is_null() || buf.is_empty() {
            return None;
        }
        let args = self.args.take()?;

        // SAFETY: `buf` is writable for `buf.len()` bytes, `format` and
        // `args` are valid per `new`'s contract.
        let n = unsafe { vsnprintf(buf.as_mut_ptr().cast(), buf.len(), self.format, args) };

        usize::try_from(n).ok()
    }

    fn can_render_again(&self) -> bool {
        cfg!(all(target_arch = "x86_64", not(windows))) && self.args.is_some()
    }
}
