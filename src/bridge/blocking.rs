//! `BlockingCall`: submit, then park the caller on a condvar until the reply arrives.
//!
//! The context, the wait state and the optional reply all live in one
//! [`PendingCall`] behind an `Arc`. Submitting leaks one strong reference into
//! the context's user data (the "ticket"); the callback takes it back on the
//! first delivery. So the allocation is freed by whoever lets go last: the
//! caller after waking, or a reply that shows up after the caller timed out.
//!
//! The lock is not held across `HLunaServiceCall`, which keeps a callback that
//! fires inside the submission itself from deadlocking.

use std::ffi::{CStr, c_int, c_void};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::context::{CallContext, ContextLedger};
use crate::abi::{self, CALLBACK_HANDLED, ContextFields, LSHandle, LSMessage};
use crate::bus::ServiceBus;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Submitted,
    Completed,
    /// the caller timed out and left
    Abandoned,
}

struct WaitSlot {
    state: CallState,
    payload: Option<String>,
}

struct PendingCall {
    context: CallContext,
    bus: Arc<dyn ServiceBus>,
    capture: bool,
    strict: bool,
    slot: Mutex<WaitSlot>,
    ready: Condvar,
}

// The context bytes are only written by the bus while the call is outstanding;
// everything else is behind the mutex.
unsafe impl Send for PendingCall {}
unsafe impl Sync for PendingCall {}

pub(super) struct BlockingCall<'a> {
    pub uri: &'a CStr,
    pub payload: &'a CStr,
    pub public: bool,
    pub capture: bool,
    pub timeout: Option<Duration>,
    pub strict: bool,
}

pub(super) fn run(
    bus: Arc<dyn ServiceBus>,
    ledger: &Arc<ContextLedger>,
    call: BlockingCall<'_>,
) -> Result<Option<String>> {
    let abi = bus.abi();
    let pending = Arc::new_cyclic(|this: &Weak<PendingCall>| {
        let fields = ContextFields {
            callback: Some(blocking_reply),
            userdata: this.as_ptr().cast_mut().cast(),
            multiple: false,
            public: call.public,
        };
        PendingCall {
            context: CallContext::new(ledger, abi, &fields),
            bus: Arc::clone(&bus),
            capture: call.capture,
            strict: call.strict,
            slot: Mutex::new(WaitSlot {
                state: CallState::Submitted,
                payload: None,
            }),
            ready: Condvar::new(),
        }
    });

    let ticket = Arc::into_raw(Arc::clone(&pending));
    let status = unsafe { bus.call(call.uri, call.payload, pending.context.as_raw()) };
    if status != 0 {
        // 被拒绝的调用不会有回调, 票要自己收回来
        drop(unsafe { Arc::from_raw(ticket) });
        return Err(BridgeError::rejected(call.uri.to_string_lossy(), status));
    }
    tracing::trace!(uri = ?call.uri, "waiting for reply");

    // 超时大到算不出截止时间, 就当作没有超时
    let deadline = call
        .timeout
        .and_then(|timeout| Some((timeout, Instant::now().checked_add(timeout)?)));

    let mut slot = pending.slot.lock();
    match deadline {
        None => {
            while slot.state == CallState::Submitted {
                pending.ready.wait(&mut slot);
            }
        }
        Some((timeout, deadline)) => {
            while slot.state == CallState::Submitted {
                if pending.ready.wait_until(&mut slot, deadline).timed_out()
                    && slot.state == CallState::Submitted
                {
                    slot.state = CallState::Abandoned;
                    tracing::warn!(uri = ?call.uri, ?timeout, "no reply, abandoning call");
                    return Err(BridgeError::timed_out(call.uri.to_string_lossy(), timeout));
                }
            }
        }
    }
    Ok(slot.payload.take())
}

unsafe extern "C" fn blocking_reply(
    _sh: *mut LSHandle,
    reply: *mut LSMessage,
    ctx: *mut c_void,
) -> c_int {
    let ticket: *const PendingCall = unsafe { abi::header(ctx) }.userdata.cast_const().cast();
    let first = unsafe { (*ticket).complete(reply) };
    if first {
        drop(unsafe { Arc::from_raw(ticket) });
    }
    CALLBACK_HANDLED
}

impl PendingCall {
    /// Returns `true` for the one delivery that owns the ticket.
    fn complete(&self, reply: *mut LSMessage) -> bool {
        let payload = if self.capture {
            unsafe { self.bus.message(reply) }
        } else {
            None
        };

        let mut slot = self.slot.lock();
        match slot.state {
            CallState::Submitted => {
                slot.state = CallState::Completed;
                slot.payload = payload;
                self.ready.notify_one();
                true
            }
            CallState::Abandoned => {
                slot.state = CallState::Completed;
                self.context.ledger().late_reply();
                tracing::debug!("late reply for an abandoned call, discarding");
                true
            }
            CallState::Completed => {
                self.context.ledger().duplicate_reply();
                tracing::error!("single-shot callback fired more than once");
                debug_assert!(!self.strict, "single-shot callback fired more than once");
                false
            }
        }
    }
}
