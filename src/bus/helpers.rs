use std::ffi::{CStr, c_int, c_void};

use serde::{Deserialize, Serialize};

use super::{DynamicLibrary, ServiceBus};
use crate::abi::{
    ContextAbi, HLunaServiceCallFn, HLunaServiceMessageFn, HNDLSetLSHandleFn,
    HUnregisterServiceCallbackFn, LSHandle, LSMessage,
};
use crate::error::{BridgeError, Result};

/// Where to find `libhelpers` and what its entry points are called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySymbols {
    pub path: String,
    pub call_symbol: String,
    pub message_symbol: String,
    pub unregister_symbol: String,
    pub set_handle_symbol: String,
}

impl Default for LibrarySymbols {
    fn default() -> Self {
        Self {
            path: "libhelpers.so.2".to_owned(),
            call_symbol: "HLunaServiceCall".to_owned(),
            message_symbol: "HLunaServiceMessage".to_owned(),
            unregister_symbol: "HUnregisterServiceCallback".to_owned(),
            set_handle_symbol: "HNDLSetLSHandle".to_owned(),
        }
    }
}

/// `libhelpers` loaded at runtime. The function table is written once here and
/// only read afterwards; unloading happens when the value is dropped.
pub struct HelpersLibrary {
    call: HLunaServiceCallFn,
    message: HLunaServiceMessageFn,
    unregister: Option<HUnregisterServiceCallbackFn>,
    set_handle: Option<HNDLSetLSHandleFn>,
    abi: ContextAbi,
    // 最后 drop，函数指针在它之前都有效
    library: DynamicLibrary,
}

impl HelpersLibrary {
    /// Loads the library, resolving the layout from the exported symbols unless `abi` is given.
    pub fn load(symbols: &LibrarySymbols, abi: Option<ContextAbi>) -> Result<Self> {
        let library = DynamicLibrary::open(&symbols.path)?;

        let call = unsafe { library.function::<HLunaServiceCallFn>(&symbols.call_symbol) }
            .ok_or_else(|| BridgeError::missing_symbol(&symbols.path, &symbols.call_symbol))?;
        let message = unsafe { library.function::<HLunaServiceMessageFn>(&symbols.message_symbol) }
            .ok_or_else(|| BridgeError::missing_symbol(&symbols.path, &symbols.message_symbol))?;
        let unregister = unsafe {
            library.function::<HUnregisterServiceCallbackFn>(&symbols.unregister_symbol)
        };
        let set_handle =
            unsafe { library.function::<HNDLSetLSHandleFn>(&symbols.set_handle_symbol) };

        let abi = abi.unwrap_or_else(|| ContextAbi::detect(unregister.is_some()));
        tracing::info!(
            library = %symbols.path,
            %abi,
            unregister = unregister.is_some(),
            "loaded service bus helpers"
        );

        Ok(Self {
            call,
            message,
            unregister,
            set_handle,
            abi,
            library,
        })
    }

    pub fn library_name(&self) -> &str {
        self.library.name()
    }
}

impl ServiceBus for HelpersLibrary {
    fn abi(&self) -> ContextAbi {
        self.abi
    }

    unsafe fn call(&self, uri: &CStr, payload: &CStr, ctx: *mut c_void) -> c_int {
        unsafe { (self.call)(uri.as_ptr(), payload.as_ptr(), ctx) }
    }

    unsafe fn message(&self, reply: *mut LSMessage) -> Option<String> {
        let raw = unsafe { (self.message)(reply) };
        if raw.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned())
    }

    unsafe fn unregister(&self, ctx: *mut c_void) -> bool {
        match self.unregister {
            Some(unregister) => {
                let status = unsafe { unregister(ctx) };
                if status != 0 {
                    tracing::warn!(status, "HUnregisterServiceCallback refused the context");
                }
                status == 0
            }
            None => false,
        }
    }

    unsafe fn set_ls_handle(&self, handle: *mut LSHandle) -> bool {
        match self.set_handle {
            Some(set_handle) if !handle.is_null() => {
                unsafe { set_handle(handle) };
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for HelpersLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelpersLibrary")
            .field("library", &self.library.name())
            .field("abi", &self.abi)
            .field("unregister", &self.unregister.is_some())
            .finish()
    }
}
