use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::abi::{ContextAbi, ContextFields, ContextStorage};

/// Counts context allocations so leaks and double frees show up in `Bridge::stats`.
#[derive(Debug, Default)]
pub(crate) struct ContextLedger {
    allocated: AtomicUsize,
    released: AtomicUsize,
    duplicate_replies: AtomicUsize,
    late_replies: AtomicUsize,
}

impl ContextLedger {
    pub(crate) fn duplicate_reply(&self) {
        self.duplicate_replies.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn late_reply(&self) {
        self.late_replies.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> ContextStats {
        ContextStats {
            allocated: self.allocated.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
            duplicate_replies: self.duplicate_replies.load(Ordering::SeqCst),
            late_replies: self.late_replies.load(Ordering::SeqCst),
        }
    }
}

/// Context bookkeeping for one bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub allocated: usize,
    pub released: usize,
    /// single-shot callbacks that fired again while the call was still live
    pub duplicate_replies: usize,
    /// replies that arrived after their blocking call timed out
    pub late_replies: usize,
}

impl ContextStats {
    /// Contexts still referenced by the bus (in flight, orphaned, or subscribed).
    pub fn outstanding(&self) -> usize {
        self.allocated.saturating_sub(self.released)
    }
}

/// The block handed to `HLunaServiceCall`. The `HContext` bytes come first so a
/// pointer to this struct is also a pointer to the C context.
#[repr(C)]
pub(crate) struct CallContext {
    storage: UnsafeCell<ContextStorage>,
    ledger: Arc<ContextLedger>,
}

impl CallContext {
    pub(crate) fn new(
        ledger: &Arc<ContextLedger>,
        abi: ContextAbi,
        fields: &ContextFields,
    ) -> Self {
        let mut storage = ContextStorage::zeroed();
        abi.write(&mut storage, fields);
        ledger.allocated.fetch_add(1, Ordering::SeqCst);
        Self {
            storage: UnsafeCell::new(storage),
            ledger: Arc::clone(ledger),
        }
    }

    pub(crate) fn as_raw(&self) -> *mut c_void {
        self.storage.get().cast()
    }

    pub(crate) fn ledger(&self) -> &ContextLedger {
        &self.ledger
    }
}

impl Drop for CallContext {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}
