//! C entry points over one process-wide [`Bridge`].
//!
//! The bridge starts detached; `lunabridge_load` attaches `libhelpers` and
//! `lunabridge_unload` lets it go again. Failures return `false`/`-1` and leave a
//! message for `lunabridge_get_error`, the way the host library reports errors.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int};

use once_cell::sync::Lazy;

use crate::abi::{ContextAbi, LSHandle};
use crate::bridge::{Bridge, ReplyCapture, ServiceCallRequest, Visibility};
use crate::config::BridgeConfig;
use crate::error::{self, BridgeError, Result};

static BRIDGE: Lazy<Bridge> = Lazy::new(Bridge::default);

thread_local! {
    static ERROR_MESSAGE: RefCell<Option<CString>> = const { RefCell::new(None) };
}

unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::invalid_argument(format!("{what} is NULL")));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| BridgeError::invalid_argument(format!("{what} is not UTF-8")))
}

/// Loads `libhelpers` from `path` (NULL: default name). `abi` 0 auto-detects the
/// context layout, otherwise it is the layout revision number.
///
/// # Safety
///
/// `path` must be NULL or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lunabridge_load(path: *const c_char, abi: u8) -> c_int {
    let result = (|| -> Result<_> {
        let mut config = BridgeConfig::default();
        if !path.is_null() {
            config.library.path = unsafe { str_arg(path, "path") }?.to_owned();
        }
        if abi != 0 {
            config.abi = Some(ContextAbi::try_from(abi).map_err(|_| {
                BridgeError::invalid_argument(format!("unknown context ABI {abi}"))
            })?);
        }
        BRIDGE.load(&config)
    })();
    match error::record(result) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn lunabridge_unload() {
    BRIDGE.detach();
}

/// Makes `libhelpers` reply through the application's own `LSHandle`. The
/// handle is remembered and handed over again after every `lunabridge_load`.
/// Returns whether the loaded library adopted it.
///
/// # Safety
///
/// `handle` must be NULL or a registered luna-service handle that outlives the library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lunabridge_set_ls_handle(handle: *mut LSHandle) -> bool {
    unsafe { BRIDGE.set_ls_handle(handle) }
}

/// Blocking call. When `output` is not NULL it receives the reply (or NULL),
/// to be released with `lunabridge_free_string`.
///
/// # Safety
///
/// `uri` and `payload` must be valid NUL-terminated strings; `output` must be
/// NULL or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lunabridge_call_sync(
    uri: *const c_char,
    payload: *const c_char,
    public: c_int,
    output: *mut *mut c_char,
) -> bool {
    if !output.is_null() {
        unsafe { *output = std::ptr::null_mut() };
    }
    let result = (|| -> Result<_> {
        let request = ServiceCallRequest::new(
            unsafe { str_arg(uri, "uri") }?,
            unsafe { str_arg(payload, "payload") }?,
        )
        .with_visibility(Visibility::from_public(public != 0));
        let capture = if output.is_null() {
            ReplyCapture::Discard
        } else {
            ReplyCapture::Capture
        };
        BRIDGE.call_sync(&request, capture)
    })();

    match error::record(result) {
        Ok(reply) => {
            if let (false, Some(reply)) = (output.is_null(), reply) {
                unsafe { *output = dup_string(&reply) };
            }
            true
        }
        Err(_) => false,
    }
}

/// Fire-and-forget call; `true` means the bus accepted it.
///
/// # Safety
///
/// `uri` and `payload` must be valid NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lunabridge_just_call(
    uri: *const c_char,
    payload: *const c_char,
    public: c_int,
) -> bool {
    let result = (|| -> Result<_> {
        let uri = unsafe { str_arg(uri, "uri") }?;
        let payload = unsafe { str_arg(payload, "payload") }?;
        BRIDGE.just_call(uri, payload, public != 0)
    })();
    error::record(result).is_ok()
}

/// # Safety
///
/// `s` must be NULL or a string returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lunabridge_free_string(s: *mut c_char) {
    if !s.is_null() {
        unsafe { libc::free(s.cast()) };
    }
}

/// Last error on the calling thread, or NULL. Valid until the next call to this function.
#[unsafe(no_mangle)]
pub extern "C" fn lunabridge_get_error() -> *const c_char {
    let message = error::last_error().and_then(|m| CString::new(m).ok());
    ERROR_MESSAGE.with(|slot| {
        let mut slot = slot.borrow_mut();
        *slot = message;
        slot.as_ref().map_or(std::ptr::null(), |m| m.as_ptr())
    })
}

// malloc 出来的, C 那边直接 free 也行
fn dup_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c) => unsafe { libc::strdup(c.as_ptr()) },
        Err(_) => std::ptr::null_mut(),
    }
}
