use std::ffi::{CStr, CString, c_void};
use std::ptr::NonNull;

use crate::error::{BridgeError, Result};

/// A shared object opened with `dlopen`, closed on drop.
#[derive(Debug)]
pub struct DynamicLibrary {
    name: String,
    handle: NonNull<c_void>,
}

// dlopen handles are process-global and dlsym is thread-safe.
unsafe impl Send for DynamicLibrary {}
unsafe impl Sync for DynamicLibrary {}

impl DynamicLibrary {
    pub fn open(name: &str) -> Result<Self> {
        let c_name = CString::new(name)
            .map_err(|_| BridgeError::invalid_argument("library name contains NUL"))?;
        let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        match NonNull::new(handle) {
            Some(handle) => Ok(Self {
                name: name.to_owned(),
                handle,
            }),
            None => Err(BridgeError::library_load(name, dl_error())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw address of `symbol`, or `None` when the library does not export it.
    pub fn symbol(&self, symbol: &str) -> Option<NonNull<c_void>> {
        let c_symbol = CString::new(symbol).ok()?;
        NonNull::new(unsafe { libc::dlsym(self.handle.as_ptr(), c_symbol.as_ptr()) })
    }

    /// Looks `symbol` up as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the exported symbol.
    pub unsafe fn function<F: Copy>(&self, symbol: &str) -> Option<F> {
        assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());
        let raw = self.symbol(symbol)?;
        Some(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&raw.as_ptr()) })
    }
}

impl Drop for DynamicLibrary {
    fn drop(&mut self) {
        if unsafe { libc::dlclose(self.handle.as_ptr()) } != 0 {
            tracing::warn!(library = %self.name, error = %dl_error(), "dlclose failed");
        }
    }
}

fn dl_error() -> String {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        "unknown dynamic loader error".to_owned()
    } else {
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library() {
        let err = DynamicLibrary::open("liblunabridge-does-not-exist.so.0").unwrap_err();
        assert!(matches!(err, BridgeError::LibraryLoad { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_open_rejects_nul() {
        let err = DynamicLibrary::open("lib\0helpers").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument { .. }));
    }
}
