//! `FireAndForget`: the context goes to the heap and the callback frees it.

use std::ffi::{CStr, c_int, c_void};
use std::sync::Arc;

use super::context::{CallContext, ContextLedger};
use crate::abi::{CALLBACK_HANDLED, ContextFields, LSHandle, LSMessage};
use crate::bus::ServiceBus;
use crate::error::{BridgeError, Result};

pub(super) fn submit(
    bus: &dyn ServiceBus,
    ledger: &Arc<ContextLedger>,
    uri: &CStr,
    payload: &CStr,
    public: bool,
) -> Result<()> {
    let fields = ContextFields {
        callback: Some(oneshot_reply),
        userdata: std::ptr::null_mut(),
        multiple: false,
        public,
    };
    let context = Box::into_raw(Box::new(CallContext::new(ledger, bus.abi(), &fields)));

    // 接受之后 context 归回调所有, 回调可能在 call 返回之前就已经把它释放了
    let status = unsafe { bus.call(uri, payload, context.cast()) };
    if status != 0 {
        drop(unsafe { Box::from_raw(context) });
        return Err(BridgeError::rejected(uri.to_string_lossy(), status));
    }
    Ok(())
}

unsafe extern "C" fn oneshot_reply(
    _sh: *mut LSHandle,
    _reply: *mut LSMessage,
    ctx: *mut c_void,
) -> c_int {
    drop(unsafe { Box::from_raw(ctx.cast::<CallContext>()) });
    CALLBACK_HANDLED
}
