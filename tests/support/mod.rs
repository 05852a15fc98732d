//! Scriptable `ServiceBus` for driving the bridge without `libhelpers`.

#![allow(dead_code)]

use std::ffi::{CStr, c_int, c_void};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use lunabridge::ServiceBus;
use lunabridge::abi::{self, ContextAbi, LSHandle, LSMessage};
use parking_lot::Mutex;

/// What the bus does with one submitted call.
#[derive(Debug, Clone)]
pub enum Response {
    /// `call` returns this status; the callback never fires
    Reject(i32),
    /// the callback fires inside `call`, before it returns
    Inline(Option<String>),
    /// the callback fires from another thread after a delay
    After(Duration, Option<String>),
    /// the callback fires twice inside `call`
    Twice(Option<String>, Option<String>),
    /// accepted; the context is kept for [`MockBus::deliver_held`]
    Hold,
    /// every message is delivered inside `call`, then the context is held
    Stream(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub uri: String,
    pub payload: String,
    pub multiple: bool,
    pub public: bool,
}

type Handler = dyn Fn(&str, &str) -> Response + Send + Sync;

pub struct MockBus {
    abi: ContextAbi,
    handler: Box<Handler>,
    calls: Mutex<Vec<Recorded>>,
    held: Mutex<Vec<usize>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    pub messages_read: AtomicUsize,
    pub callbacks_fired: Arc<AtomicUsize>,
    pub unregistered: AtomicUsize,
    /// `unregister` reports failure and keeps the context
    pub refuse_unregister: AtomicBool,
    /// last handle passed to `set_ls_handle`
    pub ls_handle: AtomicUsize,
}

struct SendPtr(*mut c_void);

unsafe impl Send for SendPtr {}

impl SendPtr {
    fn get(&self) -> *mut c_void {
        self.0
    }
}

impl MockBus {
    pub fn new(
        abi: ContextAbi,
        handler: impl Fn(&str, &str) -> Response + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            abi,
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            messages_read: AtomicUsize::new(0),
            callbacks_fired: Arc::new(AtomicUsize::new(0)),
            unregistered: AtomicUsize::new(0),
            refuse_unregister: AtomicBool::new(false),
            ls_handle: AtomicUsize::new(0),
        })
    }

    pub fn always(response: Response) -> Arc<Self> {
        Self::new(ContextAbi::LATEST, move |_, _| response.clone())
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().clone()
    }

    pub fn held(&self) -> usize {
        self.held.lock().len()
    }

    /// Waits for every reply thread spawned so far.
    pub fn join_threads(&self) {
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for thread in threads {
            thread.join().unwrap();
        }
    }

    /// Fires the callback of the `index`th held context.
    pub fn deliver_held(&self, index: usize, payload: Option<&str>) -> c_int {
        let ctx = self.held.lock()[index] as *mut c_void;
        unsafe { deliver(ctx, payload, &self.callbacks_fired) }
    }

    /// Removes and fires the `index`th held context (for single-shot contexts).
    pub fn release_held(&self, index: usize, payload: Option<&str>) -> c_int {
        let ctx = self.held.lock().remove(index) as *mut c_void;
        unsafe { deliver(ctx, payload, &self.callbacks_fired) }
    }
}

/// Fires the callback the way `libhelpers` would. The reply handle is a boxed
/// `Option<String>` that [`MockBus::message`] reads back.
unsafe fn deliver(ctx: *mut c_void, payload: Option<&str>, fired: &AtomicUsize) -> c_int {
    let reply = Box::into_raw(Box::new(payload.map(str::to_owned)));
    fired.fetch_add(1, Ordering::SeqCst);
    let rc = unsafe { abi::invoke_callback(ctx, std::ptr::null_mut(), reply.cast()) }
        .expect("context without callback");
    drop(unsafe { Box::from_raw(reply) });
    rc
}

impl ServiceBus for MockBus {
    fn abi(&self) -> ContextAbi {
        self.abi
    }

    unsafe fn call(&self, uri: &CStr, payload: &CStr, ctx: *mut c_void) -> c_int {
        let fields = unsafe { self.abi.read(ctx) };
        let uri = uri.to_str().unwrap().to_owned();
        let payload = payload.to_str().unwrap().to_owned();
        let response = (self.handler)(&uri, &payload);
        self.calls.lock().push(Recorded {
            uri,
            payload,
            multiple: fields.multiple,
            public: fields.public,
        });

        match response {
            Response::Reject(status) => status,
            Response::Inline(reply) => {
                unsafe { deliver(ctx, reply.as_deref(), &self.callbacks_fired) };
                0
            }
            Response::After(delay, reply) => {
                let ctx = SendPtr(ctx);
                let fired = Arc::clone(&self.callbacks_fired);
                let thread = std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    unsafe { deliver(ctx.get(), reply.as_deref(), &fired) };
                });
                self.threads.lock().push(thread);
                0
            }
            Response::Twice(first, second) => {
                unsafe { deliver(ctx, first.as_deref(), &self.callbacks_fired) };
                unsafe { deliver(ctx, second.as_deref(), &self.callbacks_fired) };
                0
            }
            Response::Hold => {
                self.held.lock().push(ctx as usize);
                0
            }
            Response::Stream(messages) => {
                for message in &messages {
                    unsafe { deliver(ctx, Some(message), &self.callbacks_fired) };
                }
                self.held.lock().push(ctx as usize);
                0
            }
        }
    }

    unsafe fn message(&self, reply: *mut LSMessage) -> Option<String> {
        self.messages_read.fetch_add(1, Ordering::SeqCst);
        unsafe { (*reply.cast::<Option<String>>()).clone() }
    }

    unsafe fn unregister(&self, ctx: *mut c_void) -> bool {
        if !self.abi.supports_unregister() || self.refuse_unregister.load(Ordering::SeqCst) {
            return false;
        }
        self.held.lock().retain(|held| *held != ctx as usize);
        self.unregistered.fetch_add(1, Ordering::SeqCst);
        true
    }

    unsafe fn set_ls_handle(&self, handle: *mut LSHandle) -> bool {
        self.ls_handle.store(handle as usize, Ordering::SeqCst);
        !handle.is_null()
    }
}

pub fn bridge_for(bus: &Arc<MockBus>) -> lunabridge::Bridge {
    lunabridge::Bridge::with_bus(bus.clone(), lunabridge::BridgeOptions::default())
}
