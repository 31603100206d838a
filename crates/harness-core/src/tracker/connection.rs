//! Connection and registration tracking
//!
//! ```text
//!  attach(Some) ─► connecting ─► (socket.open) registering ─► (ready) connected
//!                      │                                           │
//!                      └──── error / socket.close / socket.error ──┴─► disconnected
//! ```
//!
//! Each attach bumps a generation counter. Listener callbacks carry the
//! generation they were created for, so events from a replaced client are
//! dropped even if they were already in flight when it was detached.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use super::ActionOutcome;
use crate::activity::MessageLog;
use crate::error::SdkError;
use crate::notify::Notifier;
use crate::sdk::{ClientHandle, DeviceEvent, RegisterOptions, RtcClientEvent, SipDevice};
use crate::status::{ClientMode, ConnectionStatus, RegistrationStatus};
use crate::subscription::{Listener, Subscription};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Published whenever connection or registration status changes
#[derive(Debug, Clone)]
pub struct ConnectionChange {
    pub status: ConnectionStatus,
    pub registration: RegistrationStatus,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub mode: Option<ClientMode>,
    pub status: ConnectionStatus,
    pub registration: RegistrationStatus,
}

#[derive(Debug, Default)]
struct ConnectionState {
    status: ConnectionStatus,
    registration: RegistrationStatus,
    client: Option<ClientHandle>,
    subscription: Option<Subscription>,
    generation: u64,
}

#[derive(Debug)]
struct ConnectionInner {
    state: Mutex<ConnectionState>,
    auto_register: Mutex<Option<RegisterOptions>>,
    sip_auto_connect: bool,
    notifier: Notifier,
    messages: MessageLog,
    changes: broadcast::Sender<ConnectionChange>,
}

/// Derives [`ConnectionStatus`] / [`RegistrationStatus`] from client events
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    inner: Arc<ConnectionInner>,
}

impl ConnectionTracker {
    /// Create a tracker
    ///
    /// With `sip_auto_connect` the SIP device's WebSocket is started on
    /// attach; otherwise it waits for [`ConnectionTracker::start_ws`].
    pub fn new(notifier: Notifier, messages: MessageLog, sip_auto_connect: bool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ConnectionInner {
                state: Mutex::new(ConnectionState::default()),
                auto_register: Mutex::new(None),
                sip_auto_connect,
                notifier,
                messages,
                changes,
            }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status
    }

    pub fn registration(&self) -> RegistrationStatus {
        self.inner.state.lock().registration
    }

    /// The attached client, if any
    pub fn client(&self) -> Option<ClientHandle> {
        self.inner.state.lock().client.clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.inner.state.lock();
        ConnectionSnapshot {
            mode: state.client.as_ref().map(ClientHandle::mode),
            status: state.status,
            registration: state.registration,
        }
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionChange> {
        self.inner.changes.subscribe()
    }

    /// Register automatically whenever the SIP WebSocket connects
    pub fn set_auto_register(&self, options: Option<RegisterOptions>) {
        *self.inner.auto_register.lock() = options;
    }

    /// Whether an outbound call may be placed on the current connection
    pub fn can_place_call(&self) -> bool {
        let state = self.inner.state.lock();
        state.client.is_some() && state.status.is_connected()
    }

    /// Replace the attached client
    ///
    /// The previous client is detached first. `None` means no usable client
    /// (for example missing credentials) and never triggers a connect.
    /// Connect failures are absorbed into `disconnected`.
    pub async fn attach(&self, client: Option<ClientHandle>) {
        self.detach().await;

        let Some(client) = client else {
            tracing::debug!("No client available, not connecting");
            return;
        };

        let will_connect = match &client {
            ClientHandle::Sdk(_) => true,
            ClientHandle::SipJs(_) => self.inner.sip_auto_connect,
        };

        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.client = Some(client.clone());
            let status = if will_connect {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Idle
            };
            self.apply(&mut state, Some(status), None);
            if client.mode() == ClientMode::Sipjs {
                self.apply(&mut state, None, Some(RegistrationStatus::Unregistered));
            }
            state.generation
        };

        let subscription = match &client {
            ClientHandle::Sdk(rtc) => rtc.subscribe(self.sdk_listener(generation)),
            ClientHandle::SipJs(device) => device.subscribe(self.device_listener(generation)),
        };
        {
            let mut state = self.inner.state.lock();
            if state.generation == generation {
                state.subscription = Some(subscription);
            } else {
                drop(state);
                subscription.dispose();
                return;
            }
        }

        tracing::info!(mode = %client.mode(), generation, "Client attached");

        if !will_connect {
            return;
        }
        let result = match &client {
            ClientHandle::Sdk(rtc) => rtc.connect().await,
            ClientHandle::SipJs(device) => device.start_ws().await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Client connect failed");
            self.set_status(generation, ConnectionStatus::Disconnected);
        }
    }

    /// Tear down the attached client
    ///
    /// Listeners are disposed before the client is told to disconnect, so
    /// nothing it emits while shutting down reaches the tracker.
    pub async fn detach(&self) {
        let (client, subscription) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            let client = state.client.take();
            let subscription = state.subscription.take();
            if let Some(client) = &client {
                let registration = match client.mode() {
                    ClientMode::Sipjs => Some(RegistrationStatus::Unregistered),
                    _ => None,
                };
                self.apply(&mut state, Some(ConnectionStatus::Disconnected), registration);
            }
            (client, subscription)
        };

        if let Some(subscription) = subscription {
            subscription.dispose();
        }

        let Some(client) = client else {
            return;
        };
        tracing::info!(mode = %client.mode(), "Client detached");
        let result = match &client {
            ClientHandle::Sdk(rtc) => rtc.disconnect().await,
            ClientHandle::SipJs(device) => device.stop_ws().await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Client disconnect failed");
        }
    }

    // --- SIP device operations ---------------------------------------------

    /// Start the SIP WebSocket
    pub async fn start_ws(&self) -> ActionOutcome {
        let Some((generation, device)) = self.sip_device() else {
            return ActionOutcome::NoClient;
        };
        match device.start_ws().await {
            Ok(()) => ActionOutcome::Sent,
            Err(e) => {
                self.set_status(generation, ConnectionStatus::Disconnected);
                self.report("Failed to connect WebSocket", e)
            }
        }
    }

    /// Stop the SIP WebSocket
    pub async fn stop_ws(&self) -> ActionOutcome {
        let Some((_, device)) = self.sip_device() else {
            return ActionOutcome::NoClient;
        };
        match device.stop_ws().await {
            Ok(()) => ActionOutcome::Sent,
            Err(e) => self.report("Failed to disconnect WebSocket", e),
        }
    }

    /// Register the SIP device; status becomes `registering` until the
    /// device reports the outcome
    pub async fn register(&self, options: &RegisterOptions) -> ActionOutcome {
        let Some((generation, device)) = self.sip_device() else {
            return ActionOutcome::NoClient;
        };
        self.set_registration(generation, RegistrationStatus::Registering);
        match device.register(options).await {
            Ok(()) => ActionOutcome::Sent,
            Err(e) => {
                self.set_registration(generation, RegistrationStatus::Unregistered);
                self.report("Failed to register", e)
            }
        }
    }

    pub async fn unregister(&self, options: &RegisterOptions) -> ActionOutcome {
        let Some((_, device)) = self.sip_device() else {
            return ActionOutcome::NoClient;
        };
        match device.unregister(options).await {
            Ok(()) => ActionOutcome::Sent,
            Err(e) => self.report("Failed to unregister", e),
        }
    }

    /// Ask whether the client is registered
    ///
    /// The SDK client asks the server. The SIP device answers from its
    /// tracked registration status. `None` without a client or when the
    /// query fails.
    pub async fn check_registration(&self) -> Option<bool> {
        match self.client()? {
            ClientHandle::Sdk(rtc) => match rtc.is_registered().await {
                Ok(registered) => {
                    tracing::info!(registered, "Registration checked");
                    Some(registered)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Registration check failed");
                    self.report("Failed to check registration", e);
                    None
                }
            },
            ClientHandle::SipJs(_) => Some(self.registration().is_registered()),
        }
    }

    fn sip_device(&self) -> Option<(u64, Arc<dyn SipDevice>)> {
        let state = self.inner.state.lock();
        match &state.client {
            Some(ClientHandle::SipJs(device)) => Some((state.generation, device.clone())),
            _ => None,
        }
    }

    fn report(&self, title: &str, error: SdkError) -> ActionOutcome {
        self.inner.notifier.error(title, error.message.clone());
        ActionOutcome::Failed {
            message: error.message,
        }
    }

    // --- event handling -----------------------------------------------------

    fn sdk_listener(&self, generation: u64) -> Listener<RtcClientEvent> {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |event: &RtcClientEvent| {
            if let Some(tracker) = Self::from_weak(&inner) {
                tracker.handle_sdk_event(generation, event);
            }
        })
    }

    fn device_listener(&self, generation: u64) -> Listener<DeviceEvent> {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |event: &DeviceEvent| {
            if let Some(tracker) = Self::from_weak(&inner) {
                tracker.handle_device_event(generation, event);
            }
        })
    }

    fn from_weak(inner: &Weak<ConnectionInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    fn handle_sdk_event(&self, generation: u64, event: &RtcClientEvent) {
        tracing::trace!(event = event.name(), generation, "Client event");
        match event {
            RtcClientEvent::Ready => {
                self.set_status(generation, ConnectionStatus::Connected);
            }
            RtcClientEvent::SocketOpen => {
                self.mark_registering(generation);
            }
            RtcClientEvent::Error { message } | RtcClientEvent::SocketError { message } => {
                tracing::warn!(event = event.name(), error = %message, "Client transport error");
                self.set_status(generation, ConnectionStatus::Disconnected);
            }
            RtcClientEvent::SocketClose => {
                tracing::info!("Client socket closed");
                self.set_status(generation, ConnectionStatus::Disconnected);
            }
            RtcClientEvent::SocketMessage(payload) => {
                if self.is_current(generation) {
                    self.inner.messages.push_json(payload);
                }
            }
            RtcClientEvent::Notification(_) | RtcClientEvent::StatsFrame(_) => {}
        }
    }

    fn handle_device_event(&self, generation: u64, event: &DeviceEvent) {
        match event {
            DeviceEvent::WsConnecting { attempts } => {
                tracing::debug!(attempts, "SIP WebSocket connecting");
                self.set_status(generation, ConnectionStatus::Connecting);
            }
            DeviceEvent::WsConnected => {
                tracing::info!("SIP WebSocket connected");
                if self.set_status(generation, ConnectionStatus::Connected) {
                    self.maybe_auto_register(generation);
                }
            }
            DeviceEvent::WsDisconnected => {
                tracing::info!("SIP WebSocket disconnected");
                self.set_status(generation, ConnectionStatus::Disconnected);
            }
            DeviceEvent::Registered => {
                self.set_registration(generation, RegistrationStatus::Registered);
            }
            DeviceEvent::Unregistered => {
                self.set_registration(generation, RegistrationStatus::Unregistered);
            }
            DeviceEvent::RegistrationFailed { cause } => {
                tracing::error!(cause = %cause, "SIP registration failed");
                if self.is_current(generation) {
                    self.set_registration(generation, RegistrationStatus::Unregistered);
                    self.inner
                        .notifier
                        .error(format!("Registration failed: {cause}"), cause.clone());
                }
            }
            DeviceEvent::Message { body } => {
                if self.is_current(generation) {
                    self.inner.messages.push_text(body.clone());
                }
            }
            DeviceEvent::IncomingInvite { .. } => {}
        }
    }

    fn maybe_auto_register(&self, generation: u64) {
        let Some(options) = self.inner.auto_register.lock().clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime, skipping automatic registration");
            return;
        };
        let tracker = self.clone();
        runtime.spawn(async move {
            if tracker.is_current(generation) {
                tracker.register(&options).await;
            }
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.inner.state.lock();
        state.generation == generation && state.client.is_some()
    }

    /// `socket.open` only moves a client that is not yet connected
    fn mark_registering(&self, generation: u64) -> bool {
        let mut state = self.inner.state.lock();
        if state.generation != generation || state.client.is_none() || state.status.is_connected() {
            return false;
        }
        self.apply(&mut state, Some(ConnectionStatus::Registering), None)
    }

    /// Returns whether the status changed
    fn set_status(&self, generation: u64, status: ConnectionStatus) -> bool {
        let mut state = self.inner.state.lock();
        if state.generation != generation || state.client.is_none() {
            tracing::debug!(generation, status = %status, "Dropping event from detached client");
            return false;
        }
        self.apply(&mut state, Some(status), None)
    }

    fn set_registration(&self, generation: u64, registration: RegistrationStatus) -> bool {
        let mut state = self.inner.state.lock();
        if state.generation != generation || state.client.is_none() {
            tracing::debug!(generation, registration = %registration, "Dropping event from detached client");
            return false;
        }
        self.apply(&mut state, None, Some(registration))
    }

    fn apply(
        &self,
        state: &mut ConnectionState,
        status: Option<ConnectionStatus>,
        registration: Option<RegistrationStatus>,
    ) -> bool {
        let mut changed = false;
        if let Some(status) = status {
            if state.status != status {
                tracing::debug!(from = %state.status, to = %status, "Connection status");
                state.status = status;
                changed = true;
            }
        }
        if let Some(registration) = registration {
            if state.registration != registration {
                tracing::debug!(from = %state.registration, to = %registration, "Registration status");
                state.registration = registration;
                changed = true;
            }
        }
        if changed {
            let _ = self.inner.changes.send(ConnectionChange {
                status: state.status,
                registration: state.registration,
                timestamp: Utc::now(),
            });
        }
        changed
    }
}
