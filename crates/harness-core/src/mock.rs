//! Scripted in-memory SDK collaborators
//!
//! These implement the [`crate::sdk`] traits without any network. Tests and
//! demos drive them by emitting events by hand:
//!
//! ```rust
//! use std::sync::Arc;
//! use rtc_harness_core::mock::MockRtcClient;
//! use rtc_harness_core::sdk::{RtcClientEvent, RtcClient};
//! use rtc_harness_core::subscription::Listener;
//!
//! let client = MockRtcClient::new();
//! let listener: Listener<RtcClientEvent> = Arc::new(|event: &RtcClientEvent| {
//!     println!("{}", event.name());
//! });
//! let _subscription = client.subscribe(listener);
//! client.emit(RtcClientEvent::Ready);
//! ```
//!
//! Call actions only record themselves; state changes still have to be
//! emitted, exactly as with the real SDKs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::dtmf::DtmfDigit;
use crate::error::SdkError;
use crate::media::MediaStreams;
use crate::profile::options::{ClientOptions, SimpleUserClientOptions};
use crate::sdk::{
    AnswerOptions, CallId, CallOptions, ClientFactory, DeviceEvent, MediaStreamId,
    RegisterOptions, RtcCall, RtcClient, RtcClientEvent, RtcNotification, SipCall, SipCallEvent,
    SipDevice,
};
use crate::stats::StatsFrame;
use crate::status::CallDirection;
use crate::subscription::{Listener, ListenerRegistry, Subscription};

/// Action log with per-action scripted failures
#[derive(Debug, Default)]
struct ActionRecorder {
    log: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
}

impl ActionRecorder {
    fn record(&self, action: &str, entry: String) -> Result<(), SdkError> {
        self.log.lock().push(entry);
        match self.failures.lock().get(action) {
            Some(message) => Err(SdkError::new(message.clone())),
            None => Ok(()),
        }
    }

    fn fail(&self, action: &str, message: &str) {
        self.failures
            .lock()
            .insert(action.to_string(), message.to_string());
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn count(&self, action: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|entry| entry.as_str() == action || entry.starts_with(&format!("{action}:")))
            .count()
    }
}

// ---------------------------------------------------------------------------
// sdk mode
// ---------------------------------------------------------------------------

/// In-memory [`RtcClient`]
#[derive(Debug, Default)]
pub struct MockRtcClient {
    listeners: ListenerRegistry<RtcClientEvent>,
    recorder: ActionRecorder,
    placed: Mutex<Vec<Arc<MockRtcCall>>>,
    registered: AtomicBool,
}

impl MockRtcClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `event` to every subscriber
    pub fn emit(&self, event: RtcClientEvent) {
        self.listeners.emit(&event);
    }

    /// Emit a `callUpdate` notification for `call`
    pub fn notify_call(&self, call: &Arc<MockRtcCall>) {
        let call: Arc<dyn RtcCall> = call.clone();
        self.emit(RtcClientEvent::Notification(RtcNotification::CallUpdate {
            call,
        }));
    }

    /// Move `call` to `state` and notify
    pub fn update_call(&self, call: &Arc<MockRtcCall>, state: &str) {
        call.set_state(state);
        self.notify_call(call);
    }

    /// Ring a new inbound call
    pub fn incoming_call(&self, id: &str, caller: &str) -> Arc<MockRtcCall> {
        let call = MockRtcCall::new(id, CallDirection::Inbound, Some(caller.to_string()));
        call.set_state("ringing");
        self.notify_call(&call);
        call
    }

    /// Calls created through [`RtcClient::new_call`]
    pub fn placed_calls(&self) -> Vec<Arc<MockRtcCall>> {
        self.placed.lock().clone()
    }

    pub fn last_placed_call(&self) -> Option<Arc<MockRtcCall>> {
        self.placed.lock().last().cloned()
    }

    /// Answer for [`RtcClient::is_registered`]
    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    /// Push a quality frame to subscribers
    pub fn emit_stats(&self, frame: StatsFrame) {
        self.emit(RtcClientEvent::StatsFrame(frame));
    }

    pub fn connect_count(&self) -> usize {
        self.recorder.count("connect")
    }

    pub fn disconnect_count(&self) -> usize {
        self.recorder.count("disconnect")
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Make `action` (`connect`, `disconnect`, `new_call`, `is_registered`) fail with `message`
    pub fn fail_action(&self, action: &str, message: &str) {
        self.recorder.fail(action, message);
    }
}

#[async_trait]
impl RtcClient for MockRtcClient {
    async fn connect(&self) -> Result<(), SdkError> {
        self.recorder.record("connect", "connect".to_string())
    }

    async fn disconnect(&self) -> Result<(), SdkError> {
        self.recorder.record("disconnect", "disconnect".to_string())
    }

    async fn is_registered(&self) -> Result<bool, SdkError> {
        self.recorder
            .record("is_registered", "is_registered".to_string())?;
        Ok(self.registered.load(Ordering::SeqCst))
    }

    fn subscribe(&self, listener: Listener<RtcClientEvent>) -> Subscription {
        self.listeners.subscribe(listener)
    }

    fn new_call(&self, options: &CallOptions) -> Result<Arc<dyn RtcCall>, SdkError> {
        self.recorder.record(
            "new_call",
            format!("new_call:{}", options.destination_number),
        )?;
        let call = MockRtcCall::new(
            &Uuid::new_v4().to_string(),
            CallDirection::Outbound,
            Some(options.destination_number.clone()),
        );
        self.placed.lock().push(call.clone());
        Ok(call)
    }
}

/// In-memory [`RtcCall`]
#[derive(Debug)]
pub struct MockRtcCall {
    id: CallId,
    direction: CallDirection,
    remote_number: Option<String>,
    state: Mutex<String>,
    cause: Mutex<Option<String>>,
    sip_reason: Mutex<Option<String>>,
    sip_call_id: Mutex<Option<String>>,
    streams: Mutex<MediaStreams>,
    muted: AtomicBool,
    recorder: ActionRecorder,
}

impl MockRtcCall {
    pub fn new(id: &str, direction: CallDirection, remote_number: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            direction,
            remote_number,
            state: Mutex::new("new".to_string()),
            cause: Mutex::new(None),
            sip_reason: Mutex::new(None),
            sip_call_id: Mutex::new(None),
            streams: Mutex::new(MediaStreams::default()),
            muted: AtomicBool::new(false),
            recorder: ActionRecorder::default(),
        })
    }

    pub fn set_state(&self, state: &str) {
        *self.state.lock() = state.to_string();
    }

    pub fn set_cause(&self, cause: Option<&str>) {
        *self.cause.lock() = cause.map(str::to_string);
    }

    pub fn set_sip_reason(&self, reason: Option<&str>) {
        *self.sip_reason.lock() = reason.map(str::to_string);
    }

    pub fn set_sip_call_id(&self, id: Option<&str>) {
        *self.sip_call_id.lock() = id.map(str::to_string);
    }

    pub fn set_streams(&self, local: Option<&str>, remote: Option<&str>) {
        *self.streams.lock() = MediaStreams {
            local: local.map(MediaStreamId::new),
            remote: remote.map(MediaStreamId::new),
        };
    }

    /// Actions invoked so far, e.g. `"answer"` or `"dtmf:5"`
    pub fn actions(&self) -> Vec<String> {
        self.recorder.entries()
    }

    /// Make `action` fail with `message`
    pub fn fail_action(&self, action: &str, message: &str) {
        self.recorder.fail(action, message);
    }
}

#[async_trait]
impl RtcCall for MockRtcCall {
    fn id(&self) -> CallId {
        self.id.clone()
    }

    fn direction(&self) -> CallDirection {
        self.direction
    }

    fn state(&self) -> String {
        self.state.lock().clone()
    }

    fn cause(&self) -> Option<String> {
        self.cause.lock().clone()
    }

    fn sip_reason(&self) -> Option<String> {
        self.sip_reason.lock().clone()
    }

    fn sip_call_id(&self) -> Option<String> {
        self.sip_call_id.lock().clone()
    }

    fn remote_number(&self) -> Option<String> {
        self.remote_number.clone()
    }

    async fn answer(&self, _options: AnswerOptions) -> Result<(), SdkError> {
        self.recorder.record("answer", "answer".to_string())
    }

    async fn hangup(&self) -> Result<(), SdkError> {
        self.recorder.record("hangup", "hangup".to_string())
    }

    async fn hold(&self) -> Result<(), SdkError> {
        self.recorder.record("hold", "hold".to_string())
    }

    async fn unhold(&self) -> Result<(), SdkError> {
        self.recorder.record("unhold", "unhold".to_string())
    }

    async fn dtmf(&self, digit: DtmfDigit) -> Result<(), SdkError> {
        self.recorder.record("dtmf", format!("dtmf:{digit}"))
    }

    fn toggle_audio_mute(&self) -> Result<(), SdkError> {
        self.recorder.record("toggle_mute", "toggle_mute".to_string())?;
        self.muted.fetch_xor(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_audio_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn local_stream(&self) -> Option<MediaStreamId> {
        self.streams.lock().local.clone()
    }

    fn remote_stream(&self) -> Option<MediaStreamId> {
        self.streams.lock().remote.clone()
    }
}

// ---------------------------------------------------------------------------
// sipjs mode
// ---------------------------------------------------------------------------

/// In-memory [`SipDevice`]
#[derive(Debug, Default)]
pub struct MockSipDevice {
    listeners: ListenerRegistry<DeviceEvent>,
    recorder: ActionRecorder,
    last_register: Mutex<Option<RegisterOptions>>,
    initiated: Mutex<Vec<Arc<MockSipCall>>>,
}

impl MockSipDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: DeviceEvent) {
        self.listeners.emit(&event);
    }

    /// Deliver an inbound INVITE
    pub fn incoming_invite(&self, id: &str, remote: &str) -> Arc<MockSipCall> {
        let call = MockSipCall::new(id, true, Some(remote.to_string()));
        let handle: Arc<dyn SipCall> = call.clone();
        self.emit(DeviceEvent::IncomingInvite { call: handle });
        call
    }

    /// Calls created through [`SipDevice::initiate_call`]
    pub fn initiated_calls(&self) -> Vec<Arc<MockSipCall>> {
        self.initiated.lock().clone()
    }

    pub fn last_initiated_call(&self) -> Option<Arc<MockSipCall>> {
        self.initiated.lock().last().cloned()
    }

    /// Options passed to the latest register / unregister
    pub fn last_register_options(&self) -> Option<RegisterOptions> {
        self.last_register.lock().clone()
    }

    /// How often `action` (`start_ws`, `register`, ...) was invoked
    pub fn count(&self, action: &str) -> usize {
        self.recorder.count(action)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn fail_action(&self, action: &str, message: &str) {
        self.recorder.fail(action, message);
    }
}

#[async_trait]
impl SipDevice for MockSipDevice {
    async fn start_ws(&self) -> Result<(), SdkError> {
        self.recorder.record("start_ws", "start_ws".to_string())
    }

    async fn stop_ws(&self) -> Result<(), SdkError> {
        self.recorder.record("stop_ws", "stop_ws".to_string())
    }

    async fn register(&self, options: &RegisterOptions) -> Result<(), SdkError> {
        *self.last_register.lock() = Some(options.clone());
        self.recorder.record("register", "register".to_string())
    }

    async fn unregister(&self, options: &RegisterOptions) -> Result<(), SdkError> {
        *self.last_register.lock() = Some(options.clone());
        self.recorder.record("unregister", "unregister".to_string())
    }

    fn initiate_call(&self, destination: &str) -> Result<Arc<dyn SipCall>, SdkError> {
        self.recorder
            .record("initiate_call", format!("initiate_call:{destination}"))?;
        let call = MockSipCall::new(
            &Uuid::new_v4().to_string(),
            false,
            Some(destination.to_string()),
        );
        self.initiated.lock().push(call.clone());
        Ok(call)
    }

    fn subscribe(&self, listener: Listener<DeviceEvent>) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

/// In-memory [`SipCall`]
#[derive(Debug)]
pub struct MockSipCall {
    id: CallId,
    incoming: bool,
    remote: Option<String>,
    listeners: ListenerRegistry<SipCallEvent>,
    streams: Mutex<MediaStreams>,
    muted: AtomicBool,
    recorder: ActionRecorder,
}

impl MockSipCall {
    pub fn new(id: &str, incoming: bool, remote: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            incoming,
            remote,
            listeners: ListenerRegistry::new(),
            streams: Mutex::new(MediaStreams::default()),
            muted: AtomicBool::new(false),
            recorder: ActionRecorder::default(),
        })
    }

    pub fn emit(&self, event: SipCallEvent) {
        self.listeners.emit(&event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn set_streams(&self, local: Option<&str>, remote: Option<&str>) {
        *self.streams.lock() = MediaStreams {
            local: local.map(MediaStreamId::new),
            remote: remote.map(MediaStreamId::new),
        };
    }

    pub fn actions(&self) -> Vec<String> {
        self.recorder.entries()
    }

    pub fn fail_action(&self, action: &str, message: &str) {
        self.recorder.fail(action, message);
    }
}

#[async_trait]
impl SipCall for MockSipCall {
    fn id(&self) -> CallId {
        self.id.clone()
    }

    fn is_incoming(&self) -> bool {
        self.incoming
    }

    fn remote_identity(&self) -> Option<String> {
        self.remote.clone()
    }

    async fn accept(&self) -> Result<(), SdkError> {
        self.recorder.record("accept", "accept".to_string())
    }

    async fn reject(&self) -> Result<(), SdkError> {
        self.recorder.record("reject", "reject".to_string())
    }

    async fn disconnect(&self) -> Result<(), SdkError> {
        self.recorder.record("disconnect", "disconnect".to_string())
    }

    async fn hold(&self) -> Result<(), SdkError> {
        self.recorder.record("hold", "hold".to_string())
    }

    async fn unhold(&self) -> Result<(), SdkError> {
        self.recorder.record("unhold", "unhold".to_string())
    }

    async fn send_digits(&self, digits: &str) -> Result<(), SdkError> {
        self.recorder.record("send_digits", format!("send_digits:{digits}"))
    }

    /// Succeeds by flipping the flag and emitting `Muted` / `Unmuted`
    async fn toggle_mute(&self, mute: bool) -> Result<(), SdkError> {
        self.recorder.record("toggle_mute", format!("toggle_mute:{mute}"))?;
        self.muted.store(mute, Ordering::SeqCst);
        self.emit(if mute {
            SipCallEvent::Muted
        } else {
            SipCallEvent::Unmuted
        });
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn local_stream(&self) -> Option<MediaStreamId> {
        self.streams.lock().local.clone()
    }

    fn remote_stream(&self) -> Option<MediaStreamId> {
        self.streams.lock().remote.clone()
    }

    fn subscribe(&self, listener: Listener<SipCallEvent>) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

// ---------------------------------------------------------------------------
// factory
// ---------------------------------------------------------------------------

/// [`ClientFactory`] handing out fresh mocks and remembering them
#[derive(Debug, Default)]
pub struct MockClientFactory {
    rtc_clients: Mutex<Vec<Arc<MockRtcClient>>>,
    sip_devices: Mutex<Vec<Arc<MockSipDevice>>>,
    rtc_options: Mutex<Vec<ClientOptions>>,
    sip_options: Mutex<Vec<SimpleUserClientOptions>>,
    failure: Mutex<Option<String>>,
}

impl MockClientFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following construction fail, or succeed again with `None`
    pub fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(str::to_string);
    }

    pub fn rtc_clients(&self) -> Vec<Arc<MockRtcClient>> {
        self.rtc_clients.lock().clone()
    }

    pub fn last_rtc_client(&self) -> Option<Arc<MockRtcClient>> {
        self.rtc_clients.lock().last().cloned()
    }

    pub fn sip_devices(&self) -> Vec<Arc<MockSipDevice>> {
        self.sip_devices.lock().clone()
    }

    pub fn last_sip_device(&self) -> Option<Arc<MockSipDevice>> {
        self.sip_devices.lock().last().cloned()
    }

    /// Options of the latest SDK client construction
    pub fn last_rtc_options(&self) -> Option<ClientOptions> {
        self.rtc_options.lock().last().cloned()
    }

    pub fn last_sip_options(&self) -> Option<SimpleUserClientOptions> {
        self.sip_options.lock().last().cloned()
    }

    fn check(&self) -> Result<(), SdkError> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(SdkError::new(message.clone())),
            None => Ok(()),
        }
    }
}

impl ClientFactory for MockClientFactory {
    fn create_rtc_client(&self, options: &ClientOptions) -> Result<Arc<dyn RtcClient>, SdkError> {
        self.rtc_options.lock().push(options.clone());
        self.check()?;
        let client = MockRtcClient::new();
        self.rtc_clients.lock().push(client.clone());
        Ok(client)
    }

    fn create_sip_device(
        &self,
        options: &SimpleUserClientOptions,
    ) -> Result<Arc<dyn SipDevice>, SdkError> {
        self.sip_options.lock().push(options.clone());
        self.check()?;
        let device = MockSipDevice::new();
        self.sip_devices.lock().push(device.clone());
        Ok(device)
    }
}
