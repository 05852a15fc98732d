use std::ffi::{CStr, c_int, c_void};
use std::ptr::NonNull;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::context::{CallContext, ContextLedger};
use crate::abi::{CALLBACK_HANDLED, ContextFields, LSHandle, LSMessage};
use crate::bus::ServiceBus;
use crate::error::{BridgeError, Result};

/// Heap block for a `multiple = 1` context. `context` must stay the first field.
#[repr(C)]
struct SubscriptionContext {
    context: CallContext,
    bus: Arc<dyn ServiceBus>,
    sink: UnboundedSender<String>,
}

/// A live subscription. Replies are queued until read.
///
/// Dropping it unregisters the context. If the loaded `libhelpers` cannot
/// unregister, the context is leaked on purpose: the callback may still fire.
pub struct Subscription {
    uri: String,
    context: Option<NonNull<SubscriptionContext>>,
    receiver: UnboundedReceiver<String>,
}

// The context is only touched by the bus callback and by `cancel`, after unregistering.
unsafe impl Send for Subscription {}

pub(super) fn start(
    bus: Arc<dyn ServiceBus>,
    ledger: &Arc<ContextLedger>,
    uri: &CStr,
    payload: &CStr,
    public: bool,
) -> Result<Subscription> {
    let (sink, receiver) = mpsc::unbounded_channel();
    let fields = ContextFields {
        callback: Some(subscription_reply),
        userdata: std::ptr::null_mut(),
        multiple: true,
        public,
    };
    let context = Box::into_raw(Box::new(SubscriptionContext {
        context: CallContext::new(ledger, bus.abi(), &fields),
        bus: Arc::clone(&bus),
        sink,
    }));

    let status = unsafe { bus.call(uri, payload, context.cast()) };
    if status != 0 {
        drop(unsafe { Box::from_raw(context) });
        return Err(BridgeError::rejected(uri.to_string_lossy(), status));
    }
    Ok(Subscription {
        uri: uri.to_string_lossy().into_owned(),
        context: NonNull::new(context),
        receiver,
    })
}

unsafe extern "C" fn subscription_reply(
    _sh: *mut LSHandle,
    reply: *mut LSMessage,
    ctx: *mut c_void,
) -> c_int {
    let subscription = unsafe { &*ctx.cast::<SubscriptionContext>() };
    match unsafe { subscription.bus.message(reply) } {
        Some(message) => {
            if subscription.sink.send(message).is_err() {
                tracing::trace!("subscription receiver is gone, dropping reply");
            }
        }
        None => tracing::debug!("subscription reply without payload"),
    }
    CALLBACK_HANDLED
}

impl Subscription {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Next reply; `None` once the subscription has been cancelled and drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Blocking version of [`Subscription::recv`]. Must not be called from an async context.
    pub fn blocking_recv(&mut self) -> Option<String> {
        self.receiver.blocking_recv()
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    /// Unregisters the context. Returns `false` when the bus cannot unregister,
    /// in which case the context stays alive for the rest of the process.
    pub fn cancel(&mut self) -> bool {
        let Some(context) = self.context.take() else {
            return true;
        };
        let ptr = context.as_ptr();
        let bus = Arc::clone(unsafe { &(*ptr).bus });
        if bus.abi().supports_unregister() && unsafe { bus.unregister(ptr.cast()) } {
            drop(unsafe { Box::from_raw(ptr) });
            tracing::debug!(uri = %self.uri, "subscription cancelled");
            true
        } else {
            tracing::warn!(uri = %self.uri, "cannot unregister subscription, leaking its context");
            false
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("uri", &self.uri)
            .field("active", &self.context.is_some())
            .finish()
    }
}
