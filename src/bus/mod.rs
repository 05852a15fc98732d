//! The asynchronous submission primitive the bridge sits on.

mod dynlib;
mod helpers;

pub use dynlib::DynamicLibrary;
pub use helpers::{HelpersLibrary, LibrarySymbols};

use std::ffi::{CStr, c_int, c_void};

use crate::abi::{ContextAbi, LSHandle, LSMessage};

/// `submit(uri, payload, context) -> status` plus the accessors that go with it.
///
/// Implementations only ever borrow the context: it stays owned by the bridge
/// and is guaranteed to outlive the callback.
pub trait ServiceBus: Send + Sync {
    /// Layout this bus expects contexts in.
    fn abi(&self) -> ContextAbi;

    /// Submits a call. `0` means the callback will fire; anything else means it never will.
    ///
    /// # Safety
    ///
    /// `ctx` must point to a context written with [`ServiceBus::abi`] that stays
    /// valid until its callback has fired (single-shot) or it has been
    /// unregistered (subscription).
    unsafe fn call(&self, uri: &CStr, payload: &CStr, ctx: *mut c_void) -> c_int;

    /// Copies the payload out of a reply.
    ///
    /// # Safety
    ///
    /// `reply` must be the handle passed to the callback currently running.
    unsafe fn message(&self, reply: *mut LSMessage) -> Option<String>;

    /// Cancels a subscription context. Returns `false` when unsupported or
    /// refused; the context may then still be called back and must stay alive.
    ///
    /// # Safety
    ///
    /// `ctx` must be a context previously accepted by [`ServiceBus::call`].
    unsafe fn unregister(&self, ctx: *mut c_void) -> bool {
        let _ = ctx;
        false
    }

    /// Hands the application's own `LSHandle` to the bus so replies go through
    /// it. Returns `false` when the bus cannot adopt handles.
    ///
    /// # Safety
    ///
    /// `handle` must be a registered luna-service handle that outlives the bus.
    unsafe fn set_ls_handle(&self, handle: *mut LSHandle) -> bool {
        let _ = handle;
        false
    }
}
