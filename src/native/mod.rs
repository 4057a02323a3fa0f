//! Purpose: Safe wrapper around the native greeting shim.
//! Exports: `NativeString`, `println_from_c`, `greet`, `GREETING`.
//! Role: The only crossing into C; each call borrows a C-heap buffer for its duration.
//! Invariants: Every `NativeString` is released exactly once, in `Drop`.
//! Invariants: All FFI interaction is confined to this module + `sys`.
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr::NonNull;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::error::{Error, ErrorKind};

pub mod sys;

pub const GREETING: &str = "Hello from C";

#[cfg(test)]
static RELEASED: AtomicUsize = AtomicUsize::new(0);

/// NUL-terminated copy of a string, allocated with `malloc` and freed on drop.
#[derive(Debug)]
pub struct NativeString {
    ptr: NonNull<c_char>,
    len: usize,
}

impl NativeString {
    pub fn new(text: &str) -> Result<Self, Error> {
        let owned = CString::new(text).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("native string contains nul")
                .with_source(err)
        })?;
        let bytes = owned.as_bytes_with_nul();

        let raw = unsafe { libc::malloc(bytes.len()) } as *mut c_char;
        let ptr = NonNull::new(raw).ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("failed to allocate native string")
        })?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr() as *mut u8, bytes.len());
        }

        Ok(Self {
            ptr,
            len: text.len(),
        })
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.ptr.as_ptr()
    }

    /// Contents without the trailing NUL.
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }

    pub fn as_c_str(&self) -> &CStr {
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for NativeString {
    fn drop(&mut self) {
        unsafe {
            libc::free(self.ptr.as_ptr() as *mut libc::c_void);
        }
        #[cfg(test)]
        RELEASED.fetch_add(1, Ordering::Relaxed);
    }
}

/// Prints `text` plus a newline to stdout through C stdio.
pub fn println_from_c(text: &str) -> Result<(), Error> {
    let native = NativeString::new(text)?;
    unsafe {
        sys::hello_println(native.as_ptr());
    }
    Ok(())
}

pub fn greet() -> Result<(), Error> {
    println_from_c(GREETING)
}
