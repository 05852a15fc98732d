//! C-side view of the `libhelpers` call context.
//!
//! `HContext` changed shape between `libhelpers` releases. Every revision starts
//! with the same `{ callback, userdata }` header, which is all a callback needs
//! to find its way back to Rust state. The rest of the layout is selected at
//! runtime through [`ContextAbi`].

mod context;

pub use context::{CONTEXT_STORAGE_SIZE, ContextFields, ContextHeader, ContextStorage};

use std::ffi::{c_char, c_int, c_void};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Opaque `LSHandle` from `libluna-service2`.
#[repr(C)]
pub struct LSHandle {
    _private: [u8; 0],
}

/// Opaque `LSMessage` from `libluna-service2`. Only valid inside a callback.
#[repr(C)]
pub struct LSMessage {
    _private: [u8; 0],
}

pub type LSMessageToken = std::ffi::c_ulong;

/// `LSFilterFunc`, with the context passed as an untyped pointer.
pub type LSFilterFn =
    unsafe extern "C" fn(sh: *mut LSHandle, reply: *mut LSMessage, ctx: *mut c_void) -> c_int;

/// `HLunaServiceCall(uri, payload, context)`.
pub type HLunaServiceCallFn =
    unsafe extern "C" fn(uri: *const c_char, payload: *const c_char, ctx: *mut c_void) -> c_int;

/// `HLunaServiceMessage(msg)`.
pub type HLunaServiceMessageFn = unsafe extern "C" fn(msg: *mut LSMessage) -> *const c_char;

/// `HUnregisterServiceCallback(context)`.
pub type HUnregisterServiceCallbackFn = unsafe extern "C" fn(ctx: *mut c_void) -> c_int;

/// `HNDLSetLSHandle(handle)`.
pub type HNDLSetLSHandleFn = unsafe extern "C" fn(handle: *mut LSHandle);

/// Callbacks return this to tell `libhelpers` the message was consumed.
pub const CALLBACK_HANDLED: c_int = 1;

/// Which `HContext` layout the loaded `libhelpers` expects.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum ContextAbi {
    /// `{ callback, userdata, multiple, pub, ret_token }`
    V1 = 1,
    /// `{ callback, userdata, unknown, multiple, pub, ret_token }`.
    /// Ships `HUnregisterServiceCallback`.
    V2 = 2,
}

impl ContextAbi {
    pub const LATEST: ContextAbi = ContextAbi::V2;

    /// Picks the layout from what the library exports.
    pub fn detect(has_unregister: bool) -> Self {
        if has_unregister {
            ContextAbi::V2
        } else {
            ContextAbi::V1
        }
    }

    /// Whether long-lived contexts registered with this revision can be cancelled.
    pub fn supports_unregister(self) -> bool {
        matches!(self, ContextAbi::V2)
    }

    /// Lays `fields` out at the start of `storage`. The rest of the block stays zeroed.
    pub fn write(self, storage: &mut ContextStorage, fields: &ContextFields) {
        storage.clear();
        let base = storage.as_mut_ptr();
        // SAFETY: both layouts are smaller than the storage block, and the block is 8-aligned.
        unsafe {
            match self {
                ContextAbi::V1 => base.cast::<context::HContextV1>().write(fields.into()),
                ContextAbi::V2 => base.cast::<context::HContextV2>().write(fields.into()),
            }
        }
    }

    /// Reads a context previously laid out with this revision.
    ///
    /// # Safety
    ///
    /// `ctx` must point to a live context written with the same `ContextAbi`.
    pub unsafe fn read(self, ctx: *const c_void) -> ContextFields {
        unsafe {
            match self {
                ContextAbi::V1 => (&*ctx.cast::<context::HContextV1>()).into(),
                ContextAbi::V2 => (&*ctx.cast::<context::HContextV2>()).into(),
            }
        }
    }
}

impl std::fmt::Display for ContextAbi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextAbi::V1 => f.write_str("v1"),
            ContextAbi::V2 => f.write_str("v2"),
        }
    }
}

/// Reads the layout-independent header of any context.
///
/// # Safety
///
/// `ctx` must point to a live context of any revision.
pub unsafe fn header(ctx: *const c_void) -> ContextHeader {
    unsafe { ctx.cast::<ContextHeader>().read() }
}

/// Delivers `reply` to the callback stored in `ctx`, the way `libhelpers` does.
///
/// Returns `None` when the context carries no callback. After this returns the
/// context may already be freed.
///
/// # Safety
///
/// `ctx` must point to a live context and `reply` must be whatever the bus's
/// message accessor expects.
pub unsafe fn invoke_callback(
    ctx: *mut c_void,
    sh: *mut LSHandle,
    reply: *mut LSMessage,
) -> Option<c_int> {
    let callback = unsafe { header(ctx) }.callback?;
    Some(unsafe { callback(sh, reply, ctx) })
}
