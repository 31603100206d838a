//! The harness container
//!
//! [`Harness`] owns one instance of every tracker and log, builds the
//! client for the active [`ClientMode`], wires SDK listeners into the
//! trackers and exposes the user-level actions.
//!
//! ```text
//!                       ┌──────────── Harness ─────────────┐
//!  ClientFactory ──►    │  ProfileStore   (settings)       │
//!   (per mode)          │  ConnectionTracker ◄── client    │
//!                       │  CallTracker       ◄── calls     │
//!                       │  Notifier / ActivityLog / Msgs   │
//!                       └───────────────┬──────────────────┘
//!                                       ▼
//!                          snapshot() / current_view()
//! ```
//!
//! # Mode switching
//!
//! Switching mode (or reloading after an options change) is serialized.
//! The old wiring is disposed, the tracked call dropped and the client
//! detached before a new client is built, so nothing the old client emits
//! afterwards can reach the trackers.

pub mod builder;
pub mod config;


use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

pub use builder::HarnessBuilder;
pub use config::HarnessConfig;

use crate::activity::{ActivityLog, MessageLog};
use crate::agent::AgentWidget;
use crate::error::{HarnessError, HarnessResult, SdkError};
use crate::media::MediaStreams;
use crate::notify::Notifier;
use crate::profile::{
    CallHistoryEntry, ClientOptions, ProfileStore, SimpleUserCallOptions, SimpleUserClientOptions,
};
use crate::sdk::{
    AnswerOptions, CallOptions, ClientFactory, ClientHandle, DeviceEvent, RtcClientEvent,
    RtcNotification,
};
use crate::stats::StatsFrame;
use crate::status::{CallDirection, CallStatus, ClientMode, ConnectionStatus, RegistrationStatus};
use crate::subscription::{Listener, Subscription};
use crate::tracker::{ActionOutcome, CallNotification, CallTracker, ConnectionTracker};
use crate::transitions::CallStatePolicy;
use crate::view::{select_view, CallView};

/// Everything the presentation layer renders from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessSnapshot {
    pub mode: ClientMode,
    pub connection: ConnectionStatus,
    pub registration: RegistrationStatus,
    pub call_status: CallStatus,
    pub call: CallNotification,
    pub view: CallView,
}

struct HarnessInner {
    config: HarnessConfig,
    store: ProfileStore,
    factory: Arc<dyn ClientFactory>,
    notifier: Notifier,
    activity: ActivityLog,
    messages: MessageLog,
    connection: ConnectionTracker,
    calls: CallTracker,
    mode: RwLock<ClientMode>,
    wiring: Mutex<Option<Subscription>>,
    epoch: AtomicU64,
    agent: Mutex<Option<AgentWidget>>,
    call_options: Mutex<CallOptions>,
    switch_lock: tokio::sync::Mutex<()>,
}

/// Injectable state container of the calling harness
#[derive(Clone)]
pub struct Harness {
    inner: Arc<HarnessInner>,
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("mode", &*self.inner.mode.read())
            .field("connection", &self.inner.connection.status())
            .field("call_status", &self.inner.calls.status())
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Start building a harness
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    pub(crate) fn from_parts(
        config: HarnessConfig,
        store: ProfileStore,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let notifier = Notifier::new(config.notice_capacity);
        let activity = ActivityLog::new(config.activity_capacity);
        let messages = MessageLog::new(config.message_log_capacity);
        let connection =
            ConnectionTracker::new(notifier.clone(), messages.clone(), config.sip_auto_connect);
        let calls = CallTracker::new(
            config.reset_delay,
            config.media_poll_interval,
            notifier.clone(),
            activity.clone(),
        );
        let mode = store.client_mode();

        Self {
            inner: Arc::new(HarnessInner {
                config,
                store,
                factory,
                notifier,
                activity,
                messages,
                connection,
                calls,
                mode: RwLock::new(mode),
                wiring: Mutex::new(None),
                epoch: AtomicU64::new(0),
                agent: Mutex::new(None),
                call_options: Mutex::new(CallOptions::default()),
                switch_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    // --- lifecycle ----------------------------------------------------------

    /// Activate the persisted client mode
    pub async fn start(&self) {
        let mode = self.inner.store.client_mode();
        self.activate(mode).await;
    }

    /// Persist `mode` and activate it
    pub async fn switch_mode(&self, mode: ClientMode) -> HarnessResult<()> {
        self.inner.store.set_client_mode(mode)?;
        self.activate(mode).await;
        Ok(())
    }

    /// Rebuild the client of the current mode from the stored options
    pub async fn reload(&self) {
        let mode = self.mode();
        self.activate(mode).await;
    }

    /// Copy a saved profile into the current options and reconnect
    pub async fn select_profile(&self, login: &str) -> HarnessResult<ClientOptions> {
        let options = self.inner.store.select_profile(login)?;
        if self.mode() == ClientMode::Sdk {
            self.reload().await;
        }
        Ok(options)
    }

    /// Store new SDK options and reconnect when the SDK is active
    pub async fn update_options(&self, options: &ClientOptions) -> HarnessResult<()> {
        self.inner.store.set_current_options(options)?;
        if self.mode() == ClientMode::Sdk {
            self.reload().await;
        }
        Ok(())
    }

    /// Store new SIP device options and reconnect when the device is active
    pub async fn update_simple_user_options(
        &self,
        options: &SimpleUserClientOptions,
    ) -> HarnessResult<()> {
        self.inner.store.set_simple_user_options(options)?;
        if self.mode() == ClientMode::Sipjs {
            self.reload().await;
        }
        Ok(())
    }

    /// Store the SIP dialer settings
    ///
    /// The auto-register flag applies from the next WebSocket connect.
    pub fn update_simple_user_call_options(
        &self,
        options: &SimpleUserCallOptions,
    ) -> HarnessResult<()> {
        self.inner.store.set_simple_user_call_options(options)?;
        if self.mode() == ClientMode::Sipjs {
            self.inner
                .connection
                .set_auto_register(options.auto_register.then(|| options.register_options()));
        }
        Ok(())
    }

    /// Drop the call and disconnect the client
    pub async fn shutdown(&self) {
        let _guard = self.inner.switch_lock.lock().await;
        self.teardown().await;
        tracing::info!("Harness shut down");
    }

    async fn activate(&self, mode: ClientMode) {
        let _guard = self.inner.switch_lock.lock().await;
        self.teardown().await;

        *self.inner.mode.write() = mode;
        tracing::info!(mode = %mode, "Activating client mode");

        let client = self.build_client(mode);
        if let Some(client) = &client {
            let epoch = self.inner.epoch.load(Ordering::SeqCst);
            let wiring = self.wire(client, epoch);
            *self.inner.wiring.lock() = Some(wiring);
        }
        self.inner.connection.attach(client).await;
    }

    async fn teardown(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let wiring = self.inner.wiring.lock().take();
        if let Some(wiring) = wiring {
            wiring.dispose();
        }
        self.inner.calls.reset();
        self.inner.connection.detach().await;
    }

    fn build_client(&self, mode: ClientMode) -> Option<ClientHandle> {
        match mode {
            ClientMode::Sdk => {
                let mut options = self.inner.store.current_options();
                if !options.has_valid_credentials() {
                    tracing::info!("No login credentials or token, SDK client not created");
                    return None;
                }
                if let Some(host) = &self.inner.config.rtc_host {
                    options = options.with_host(host.clone());
                }

                let policy = self.inner.config.call_state_policy.unwrap_or(
                    if options.keeps_calls_alive() {
                        CallStatePolicy::KeepAlive
                    } else {
                        CallStatePolicy::Standard
                    },
                );
                self.inner.calls.set_policy(policy);

                match self.inner.factory.create_rtc_client(&options) {
                    Ok(client) => Some(ClientHandle::Sdk(client)),
                    Err(e) => self.client_failed(e),
                }
            }
            ClientMode::Sipjs => {
                let options = self.inner.store.simple_user_options();
                if !options.has_valid_credentials() {
                    tracing::info!("No SIP username or password, device not created");
                    return None;
                }
                if let Err(e) = options.validate() {
                    tracing::warn!(error = %e, "Invalid SIP device options");
                    self.inner.notifier.error("Invalid SIP settings", e.to_string());
                    return None;
                }

                let call_options = self.inner.store.simple_user_call_options();
                self.inner.connection.set_auto_register(
                    call_options
                        .auto_register
                        .then(|| call_options.register_options()),
                );

                match self.inner.factory.create_sip_device(&options) {
                    Ok(device) => Some(ClientHandle::SipJs(device)),
                    Err(e) => self.client_failed(e),
                }
            }
            ClientMode::Aiagent => None,
        }
    }

    fn client_failed(&self, error: SdkError) -> Option<ClientHandle> {
        tracing::warn!(error = %error, "Client construction failed");
        self.inner
            .notifier
            .error("Failed to create client", error.message);
        None
    }

    // --- wiring -------------------------------------------------------------

    fn wire(&self, client: &ClientHandle, epoch: u64) -> Subscription {
        let weak = Arc::downgrade(&self.inner);
        match client {
            ClientHandle::Sdk(rtc) => {
                let listener: Listener<RtcClientEvent> = Arc::new(move |event: &RtcClientEvent| {
                    if let Some(harness) = Self::current(&weak, epoch) {
                        harness.handle_client_event(event);
                    }
                });
                rtc.subscribe(listener)
            }
            ClientHandle::SipJs(device) => {
                let listener: Listener<DeviceEvent> = Arc::new(move |event: &DeviceEvent| {
                    if let Some(harness) = Self::current(&weak, epoch) {
                        harness.handle_device_event(event);
                    }
                });
                device.subscribe(listener)
            }
        }
    }

    fn current(weak: &Weak<HarnessInner>, epoch: u64) -> Option<Self> {
        let inner = weak.upgrade()?;
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(epoch, "Event from replaced client ignored");
            return None;
        }
        Some(Self { inner })
    }

    fn handle_client_event(&self, event: &RtcClientEvent) {
        let notification = match event {
            RtcClientEvent::Notification(notification) => notification,
            RtcClientEvent::Ready => {
                self.inner.activity.push("registered");
                return;
            }
            RtcClientEvent::SocketClose
            | RtcClientEvent::SocketError { .. }
            | RtcClientEvent::Error { .. } => {
                self.inner.activity.push("unregistered");
                return;
            }
            RtcClientEvent::StatsFrame(frame) => {
                self.inner.calls.handle_stats_frame(frame.clone());
                return;
            }
            RtcClientEvent::SocketOpen | RtcClientEvent::SocketMessage(_) => return,
        };
        match notification {
            RtcNotification::CallUpdate { call } => {
                self.inner.calls.handle_sdk_update(call);
                if let Some(entry) = CallHistoryEntry::from_finished_call(call.as_ref()) {
                    match self.inner.store.record_call(entry) {
                        Ok(true) => tracing::debug!(call_id = %call.id(), "Call added to history"),
                        Ok(false) => {}
                        Err(e) => tracing::warn!(error = %e, "Failed to record call history"),
                    }
                }
            }
            RtcNotification::UserMediaError { message } => {
                tracing::warn!(error = %message, "User media error");
                self.inner
                    .notifier
                    .error("Unable to access media devices", message.clone());
            }
            RtcNotification::Other { kind } => {
                tracing::trace!(kind = %kind, "Notification ignored");
            }
        }
    }

    fn handle_device_event(&self, event: &DeviceEvent) {
        if let DeviceEvent::IncomingInvite { call } = event {
            let from = call.remote_identity().unwrap_or_else(|| "unknown".to_string());
            tracing::info!(call_id = %call.id(), from = %from, "Incoming SIP call");
            self.inner.notifier.info(format!("Incoming call from {from}"));
            self.inner.activity.push(format!("Incoming call from {from}"));
            self.inner
                .calls
                .track_sip_call(call.clone(), CallDirection::Inbound);
        }
    }

    // --- calls --------------------------------------------------------------

    /// Place an outbound call to `destination`
    pub fn place_call(&self, destination: &str) -> ActionOutcome {
        let destination = destination.trim();
        let Some(client) = self.inner.connection.client() else {
            self.inner
                .notifier
                .error("Unable to place call", "No client is connected");
            return ActionOutcome::NoClient;
        };
        if destination.is_empty() {
            self.inner
                .notifier
                .error("Unable to place call", "Enter a destination number");
            return ActionOutcome::not_allowed("destination is empty");
        }
        if !self.inner.connection.can_place_call() {
            return ActionOutcome::not_allowed(format!(
                "cannot place a call while {}",
                self.inner.connection.status()
            ));
        }
        let status = self.inner.calls.status();
        if !status.can_place_call() {
            return ActionOutcome::not_allowed(format!("cannot place a call while {status}"));
        }

        tracing::info!(destination, mode = %client.mode(), "Placing call");
        self.inner.activity.push(format!("Calling: {destination}"));

        match client {
            ClientHandle::Sdk(rtc) => {
                let options = CallOptions {
                    destination_number: destination.to_string(),
                    ..self.inner.call_options.lock().clone()
                };
                match rtc.new_call(&options) {
                    Ok(call) => {
                        self.inner.calls.track_sdk_call(&call);
                        ActionOutcome::Sent
                    }
                    Err(e) => self.call_failed(e),
                }
            }
            ClientHandle::SipJs(device) => {
                let mut call_options = self.inner.store.simple_user_call_options();
                call_options.destination_number = destination.to_string();
                if let Err(e) = self.inner.store.set_simple_user_call_options(&call_options) {
                    tracing::warn!(error = %e, "Failed to store destination number");
                }
                match device.initiate_call(destination) {
                    Ok(call) => {
                        self.inner
                            .calls
                            .track_sip_call(call, CallDirection::Outbound);
                        ActionOutcome::Sent
                    }
                    Err(e) => self.call_failed(e),
                }
            }
        }
    }

    fn call_failed(&self, error: SdkError) -> ActionOutcome {
        tracing::warn!(error = %error, "Call could not be started");
        self.inner
            .notifier
            .error("Failed to start call", error.message.clone());
        ActionOutcome::Failed {
            message: error.message,
        }
    }

    /// Call the remote party of a history entry again
    pub fn redial(&self, entry: &CallHistoryEntry) -> ActionOutcome {
        self.place_call(&entry.destination_number)
    }

    pub async fn answer(&self, options: AnswerOptions) -> ActionOutcome {
        self.inner.calls.answer(options).await
    }

    pub async fn reject(&self) -> ActionOutcome {
        self.inner.calls.reject().await
    }

    pub async fn hangup(&self) -> ActionOutcome {
        self.inner.calls.hangup().await
    }

    pub async fn hold(&self) -> ActionOutcome {
        self.inner.calls.hold().await
    }

    pub async fn unhold(&self) -> ActionOutcome {
        self.inner.calls.unhold().await
    }

    pub async fn toggle_mute(&self) -> ActionOutcome {
        self.inner.calls.toggle_mute().await
    }

    pub async fn send_digit(&self, digit: char) -> ActionOutcome {
        self.inner.calls.send_digit(digit).await
    }

    /// Watch the media streams of the current call
    pub fn watch_media(&self, listener: Listener<MediaStreams>) -> Subscription {
        self.inner.calls.watch_media(listener)
    }

    /// Defaults for outbound SDK calls; the destination is set per call
    pub fn call_options(&self) -> CallOptions {
        self.inner.call_options.lock().clone()
    }

    pub fn set_call_options(&self, options: CallOptions) {
        *self.inner.call_options.lock() = options;
    }

    // --- SIP device ---------------------------------------------------------

    /// Register with the stored extra headers
    pub async fn register(&self) -> ActionOutcome {
        let options = self.inner.store.simple_user_call_options().register_options();
        self.inner.connection.register(&options).await
    }

    pub async fn unregister(&self) -> ActionOutcome {
        let options = self.inner.store.simple_user_call_options().register_options();
        self.inner.connection.unregister(&options).await
    }

    /// Ask the client whether it is registered, `None` without an answer
    pub async fn check_registration(&self) -> Option<bool> {
        self.inner.connection.check_registration().await
    }

    pub async fn start_ws(&self) -> ActionOutcome {
        self.inner.connection.start_ws().await
    }

    pub async fn stop_ws(&self) -> ActionOutcome {
        self.inner.connection.stop_ws().await
    }

    // --- AI agent -----------------------------------------------------------

    /// Store the widget configuration and return its embed document
    pub fn embed_agent(&self, widget: AgentWidget) -> HarnessResult<String> {
        if widget.agent_id.trim().is_empty() {
            return Err(HarnessError::config("Agent ID is required"));
        }
        if self.mode() != ClientMode::Aiagent {
            tracing::debug!(mode = %self.mode(), "Agent widget stored outside aiagent mode");
        }
        let document = widget.embed_document();
        tracing::info!(agent_id = %widget.agent_id, version = %widget.version, "Agent widget configured");
        *self.inner.agent.lock() = Some(widget);
        Ok(document)
    }

    pub fn agent_widget(&self) -> Option<AgentWidget> {
        self.inner.agent.lock().clone()
    }

    // --- derived state ------------------------------------------------------

    pub fn mode(&self) -> ClientMode {
        *self.inner.mode.read()
    }

    /// Latest quality frame of the current or last call
    pub fn stats_frame(&self) -> Option<StatsFrame> {
        self.inner.calls.stats_frame()
    }

    pub fn current_view(&self) -> CallView {
        select_view(
            self.mode(),
            self.inner.connection.status(),
            self.inner.calls.status(),
            self.inner.calls.direction(),
        )
    }

    pub fn snapshot(&self) -> HarnessSnapshot {
        let mode = self.mode();
        let connection = self.inner.connection.snapshot();
        let call_status = self.inner.calls.status();
        let call = self.inner.calls.notification();
        let view = select_view(mode, connection.status, call_status, call.direction);
        HarnessSnapshot {
            mode,
            connection: connection.status,
            registration: connection.registration,
            call_status,
            call,
            view,
        }
    }

    pub fn can_place_call(&self) -> bool {
        self.inner.connection.can_place_call() && self.inner.calls.status().can_place_call()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &ProfileStore {
        &self.inner.store
    }

    pub fn connection(&self) -> &ConnectionTracker {
        &self.inner.connection
    }

    pub fn calls(&self) -> &CallTracker {
        &self.inner.calls
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.inner.activity
    }

    pub fn messages(&self) -> &MessageLog {
        &self.inner.messages
    }
}
