//! Blocking, fire-and-forget and subscription calls over a [`ServiceBus`].

mod blocking;
mod context;
mod oneshot;
mod subscription;

pub use context::ContextStats;
pub use subscription::Subscription;

use std::ffi::CString;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::abi::LSHandle;
use crate::bus::{HelpersLibrary, ServiceBus};
use crate::config::BridgeConfig;
use crate::error::{self, BridgeError, Result};
use context::ContextLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn from_public(public: bool) -> Self {
        if public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn is_public(self) -> bool {
        matches!(self, Visibility::Public)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// callback fires exactly once
    #[default]
    SingleShot,
    /// callback may fire any number of times
    Subscription,
}

/// Whether a blocking call should hand back the reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCapture {
    Capture,
    Discard,
}

/// One outbound request. `uri` and `payload` are opaque to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCallRequest {
    pub uri: String,
    pub payload: String,
    pub visibility: Visibility,
    pub mode: DeliveryMode,
    /// overrides [`BridgeOptions::call_timeout`] for this request
    pub timeout: Option<Duration>,
}

impl ServiceCallRequest {
    pub fn new(uri: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            payload: payload.into(),
            visibility: Visibility::Public,
            mode: DeliveryMode::SingleShot,
            timeout: None,
        }
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn subscription(mut self) -> Self {
        self.mode = DeliveryMode::Subscription;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn c_strings(&self) -> Result<(CString, CString)> {
        let uri = CString::new(self.uri.as_str())
            .map_err(|_| BridgeError::invalid_argument("uri contains NUL"))?;
        let payload = CString::new(self.payload.as_str())
            .map_err(|_| BridgeError::invalid_argument("payload contains NUL"))?;
        Ok((uri, payload))
    }
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// `None` waits forever, like `libhelpers` callers always have
    pub call_timeout: Option<Duration>,
    /// assert (debug builds) when a single-shot callback fires twice
    pub strict_single_shot: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            call_timeout: None,
            strict_single_shot: cfg!(debug_assertions),
        }
    }
}

/// Owns the connection to the service bus: detached until a bus is attached or
/// loaded, detached again after [`Bridge::detach`].
pub struct Bridge {
    bus: RwLock<Option<Arc<dyn ServiceBus>>>,
    /// handed to every bus on attach, null when unset
    ls_handle: AtomicPtr<LSHandle>,
    ledger: Arc<ContextLedger>,
    options: BridgeOptions,
}

impl Bridge {
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            bus: RwLock::new(None),
            ls_handle: AtomicPtr::new(std::ptr::null_mut()),
            ledger: Arc::new(ContextLedger::default()),
            options,
        }
    }

    pub fn with_bus(bus: Arc<dyn ServiceBus>, options: BridgeOptions) -> Self {
        let bridge = Self::new(options);
        bridge.attach(bus);
        bridge
    }

    /// Loads `libhelpers` as configured and returns a ready bridge.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let bridge = Self::new(config.bridge_options());
        bridge.load(config)?;
        Ok(bridge)
    }

    /// Loads `libhelpers` and attaches it, replacing any previous bus.
    pub fn load(&self, config: &BridgeConfig) -> Result<()> {
        let library = error::record(HelpersLibrary::load(&config.library, config.abi))?;
        self.attach(Arc::new(library));
        Ok(())
    }

    /// Returns the bus that was attached before, if any.
    pub fn attach(&self, bus: Arc<dyn ServiceBus>) -> Option<Arc<dyn ServiceBus>> {
        tracing::debug!(abi = %bus.abi(), "service bus attached");
        let handle = self.ls_handle.load(Ordering::SeqCst);
        if !handle.is_null() && !unsafe { bus.set_ls_handle(handle) } {
            tracing::warn!("service bus cannot adopt the application's LSHandle");
        }
        self.bus.write().replace(bus)
    }

    /// Remembers the application's own `LSHandle` and hands it to the attached
    /// bus now and to every bus attached later. Returns whether the current bus
    /// adopted it; `false` while detached.
    ///
    /// # Safety
    ///
    /// `handle` must be null or a registered luna-service handle that stays
    /// valid for as long as a bus may use it.
    pub unsafe fn set_ls_handle(&self, handle: *mut LSHandle) -> bool {
        self.ls_handle.store(handle, Ordering::SeqCst);
        match self.bus.read().as_ref() {
            Some(bus) if !handle.is_null() => unsafe { bus.set_ls_handle(handle) },
            _ => false,
        }
    }

    /// Calls already in flight keep their own reference to the bus, so the
    /// library is only unloaded once they are done.
    pub fn detach(&self) -> Option<Arc<dyn ServiceBus>> {
        let previous = self.bus.write().take();
        if previous.is_some() {
            tracing::debug!("service bus detached");
        }
        previous
    }

    pub fn is_ready(&self) -> bool {
        self.bus.read().is_some()
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn stats(&self) -> ContextStats {
        self.ledger.snapshot()
    }

    fn bus(&self) -> Result<Arc<dyn ServiceBus>> {
        self.bus.read().clone().ok_or(BridgeError::NotInitialized)
    }

    /// Submits `request` and blocks until its callback fires (or the timeout expires).
    pub fn call_sync(
        &self,
        request: &ServiceCallRequest,
        capture: ReplyCapture,
    ) -> Result<Option<String>> {
        error::record(self.call_sync_inner(request, capture))
    }

    fn call_sync_inner(
        &self,
        request: &ServiceCallRequest,
        capture: ReplyCapture,
    ) -> Result<Option<String>> {
        if request.mode == DeliveryMode::Subscription {
            return Err(BridgeError::UnsupportedMode);
        }
        let bus = self.bus()?;
        let (uri, payload) = request.c_strings()?;
        tracing::debug!(uri = %request.uri, visibility = ?request.visibility, "blocking call");

        let reply = blocking::run(
            bus,
            &self.ledger,
            blocking::BlockingCall {
                uri: &uri,
                payload: &payload,
                public: request.visibility.is_public(),
                capture: capture == ReplyCapture::Capture,
                timeout: request.timeout.or(self.options.call_timeout),
                strict: self.options.strict_single_shot,
            },
        );
        match &reply {
            Ok(payload) => tracing::debug!(
                uri = %request.uri,
                bytes = payload.as_ref().map_or(0, String::len),
                "reply received"
            ),
            Err(err) => tracing::debug!(uri = %request.uri, %err, "blocking call failed"),
        }
        reply
    }

    /// Blocking call that captures the reply.
    pub fn call(&self, uri: &str, payload: &str, public: bool) -> Result<Option<String>> {
        let request =
            ServiceCallRequest::new(uri, payload).with_visibility(Visibility::from_public(public));
        self.call_sync(&request, ReplyCapture::Capture)
    }

    /// Submits without waiting. `Ok` only means the bus accepted the call.
    pub fn send(&self, request: &ServiceCallRequest) -> Result<()> {
        error::record(self.send_inner(request))
    }

    fn send_inner(&self, request: &ServiceCallRequest) -> Result<()> {
        if request.mode == DeliveryMode::Subscription {
            return Err(BridgeError::UnsupportedMode);
        }
        let bus = self.bus()?;
        let (uri, payload) = request.c_strings()?;
        tracing::debug!(uri = %request.uri, "fire-and-forget call");
        oneshot::submit(
            bus.as_ref(),
            &self.ledger,
            &uri,
            &payload,
            request.visibility.is_public(),
        )
    }

    pub fn just_call(&self, uri: &str, payload: &str, public: bool) -> Result<()> {
        let request =
            ServiceCallRequest::new(uri, payload).with_visibility(Visibility::from_public(public));
        self.send(&request)
    }

    /// Registers a long-lived context; every reply is queued on the returned [`Subscription`].
    pub fn subscribe(&self, request: &ServiceCallRequest) -> Result<Subscription> {
        error::record(self.subscribe_inner(request))
    }

    fn subscribe_inner(&self, request: &ServiceCallRequest) -> Result<Subscription> {
        let bus = self.bus()?;
        let (uri, payload) = request.c_strings()?;
        tracing::debug!(uri = %request.uri, "subscribing");
        subscription::start(
            bus,
            &self.ledger,
            &uri,
            &payload,
            request.visibility.is_public(),
        )
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeOptions::default())
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("ready", &self.is_ready())
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish()
    }
}
