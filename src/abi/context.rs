use std::ffi::{c_int, c_void};

use super::{LSFilterFn, LSMessageToken};

/// Bytes reserved for one context, whatever the revision.
pub const CONTEXT_STORAGE_SIZE: usize = 128;

/// Zeroed, 8-byte aligned backing block for an `HContext`.
#[repr(C, align(8))]
pub struct ContextStorage([u8; CONTEXT_STORAGE_SIZE]);

impl ContextStorage {
    pub fn zeroed() -> Self {
        Self([0; CONTEXT_STORAGE_SIZE])
    }

    pub fn clear(&mut self) {
        self.0.fill(0);
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.0.as_mut_ptr().cast()
    }
}

impl Default for ContextStorage {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl std::fmt::Debug for ContextStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStorage").finish_non_exhaustive()
    }
}

/// Prefix shared by every `HContext` revision.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ContextHeader {
    pub callback: Option<LSFilterFn>,
    pub userdata: *mut c_void,
}

/// Layout-independent view of the fields we set.
#[derive(Debug, Clone, Copy)]
pub struct ContextFields {
    pub callback: Option<LSFilterFn>,
    pub userdata: *mut c_void,
    /// subscription (`true`) or single-shot
    pub multiple: bool,
    pub public: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(super) struct HContextV1 {
    header: ContextHeader,
    multiple: c_int,
    public: c_int,
    ret_token: LSMessageToken,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(super) struct HContextV2 {
    header: ContextHeader,
    unknown: *mut c_void,
    multiple: c_int,
    public: c_int,
    ret_token: LSMessageToken,
}

const _: () = assert!(std::mem::size_of::<HContextV1>() <= CONTEXT_STORAGE_SIZE);
const _: () = assert!(std::mem::size_of::<HContextV2>() <= CONTEXT_STORAGE_SIZE);

impl From<&ContextFields> for HContextV1 {
    fn from(f: &ContextFields) -> Self {
        Self {
            header: ContextHeader {
                callback: f.callback,
                userdata: f.userdata,
            },
            multiple: f.multiple as c_int,
            public: f.public as c_int,
            ret_token: 0,
        }
    }
}

impl From<&ContextFields> for HContextV2 {
    fn from(f: &ContextFields) -> Self {
        Self {
            header: ContextHeader {
                callback: f.callback,
                userdata: f.userdata,
            },
            unknown: std::ptr::null_mut(),
            multiple: f.multiple as c_int,
            public: f.public as c_int,
            ret_token: 0,
        }
    }
}

impl From<&HContextV1> for ContextFields {
    fn from(c: &HContextV1) -> Self {
        Self {
            callback: c.header.callback,
            userdata: c.header.userdata,
            multiple: c.multiple != 0,
            public: c.public != 0,
        }
    }
}

impl From<&HContextV2> for ContextFields {
    fn from(c: &HContextV2) -> Self {
        Self {
            callback: c.header.callback,
            userdata: c.header.userdata,
            multiple: c.multiple != 0,
            public: c.public != 0,
        }
    }
}
