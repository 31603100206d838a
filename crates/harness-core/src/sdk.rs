//! Calling SDK collaborator interfaces
//!
//! The harness never talks to a network. Everything protocol related lives
//! behind the traits in this module, implemented by adapters around the
//! vendor SDKs (or by [`crate::mock`] in tests):
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │  sdk mode                    │      │  sipjs mode                  │
//! │  RtcClient ── notification ─►│      │  SipDevice ── IncomingInvite │
//! │      │        (callUpdate)   │      │      │                       │
//! │      └─ new_call ─► RtcCall  │      │      └─ initiate_call ─►     │
//! │                              │      │                SipCall       │
//! └──────────────────────────────┘      └──────────────────────────────┘
//! ```
//!
//! Which family is active is decided once, at construction, by
//! [`ClientMode`]; the harness holds the result as a [`ClientHandle`].

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dtmf::DtmfDigit;
use crate::error::SdkError;
use crate::profile::options::{ClientOptions, SimpleUserClientOptions};
use crate::stats::{StatsFrame, StatsSample};
use crate::status::{CallDirection, ClientMode};
use crate::subscription::{Listener, Subscription};

/// Identifier the SDK assigns to a call
pub type CallId = String;

/// Opaque handle to a media stream owned by the SDK
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaStreamId(pub String);

impl MediaStreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Custom SIP header attached to a call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomHeader {
    pub name: String,
    pub value: String,
}

impl CustomHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Options for an outbound SDK call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallOptions {
    pub destination_number: String,
    pub caller_number: String,
    pub caller_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_state: Option<String>,
    pub custom_headers: Vec<CustomHeader>,
    pub use_stereo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefetch_ice_candidates: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trickle_ice: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_connection_alive_on_socket_close: Option<bool>,
    #[serde(rename = "preferred_codecs", skip_serializing_if = "Vec::is_empty")]
    pub preferred_codecs: Vec<String>,
}

impl CallOptions {
    pub fn new(destination_number: impl Into<String>) -> Self {
        Self {
            destination_number: destination_number.into(),
            ..Default::default()
        }
    }

    pub fn with_caller(mut self, number: impl Into<String>, name: impl Into<String>) -> Self {
        self.caller_number = number.into();
        self.caller_name = name.into();
        self
    }

    pub fn with_custom_header(mut self, header: CustomHeader) -> Self {
        self.custom_headers.push(header);
        self
    }
}

/// Options for answering an SDK call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnswerOptions {
    pub video: bool,
    pub custom_headers: Vec<CustomHeader>,
}

/// Options passed to SIP register / unregister
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterOptions {
    /// Raw `Name: value` header lines
    pub extra_headers: Vec<String>,
}

// ---------------------------------------------------------------------------
// sdk mode
// ---------------------------------------------------------------------------

/// Notification payloads delivered by the SDK client
#[derive(Debug, Clone)]
pub enum RtcNotification {
    /// A call was created or changed state
    CallUpdate { call: Arc<dyn RtcCall> },
    /// Microphone / camera could not be acquired
    UserMediaError { message: String },
    /// Anything the harness does not model
    Other { kind: String },
}

/// Lifecycle events of the SDK client
#[derive(Debug, Clone)]
pub enum RtcClientEvent {
    /// Client authenticated and ready
    Ready,
    Error { message: String },
    SocketOpen,
    SocketClose,
    SocketError { message: String },
    /// Raw signalling message, for the message feed
    SocketMessage(serde_json::Value),
    Notification(RtcNotification),
    /// Periodic call quality figures
    StatsFrame(StatsFrame),
}

impl RtcClientEvent {
    /// Event name as the SDK spells it
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "telnyx.ready",
            Self::Error { .. } => "telnyx.error",
            Self::SocketOpen => "telnyx.socket.open",
            Self::SocketClose => "telnyx.socket.close",
            Self::SocketError { .. } => "telnyx.socket.error",
            Self::SocketMessage(_) => "telnyx.socket.message",
            Self::Notification(_) => "telnyx.notification",
            Self::StatsFrame(_) => "telnyx.stats.frame",
        }
    }
}

/// Full WebRTC SDK client
#[async_trait]
pub trait RtcClient: Send + Sync + Debug {
    /// Begin connecting; readiness is reported by [`RtcClientEvent::Ready`]
    async fn connect(&self) -> Result<(), SdkError>;

    /// Tear down the transport; no events fire afterwards
    async fn disconnect(&self) -> Result<(), SdkError>;

    /// Ask the server whether this client is currently registered
    async fn is_registered(&self) -> Result<bool, SdkError>;

    /// Subscribe to client events
    fn subscribe(&self, listener: Listener<RtcClientEvent>) -> Subscription;

    /// Start an outbound call
    fn new_call(&self, options: &CallOptions) -> Result<Arc<dyn RtcCall>, SdkError>;
}

/// Call handle of the full SDK
///
/// State changes are not pushed on the call itself; they arrive as
/// [`RtcNotification::CallUpdate`] on the owning client.
#[async_trait]
pub trait RtcCall: Send + Sync + Debug {
    fn id(&self) -> CallId;
    fn direction(&self) -> CallDirection;

    /// Raw SDK state name such as `"trying"` or `"active"`
    fn state(&self) -> String;
    fn cause(&self) -> Option<String>;
    fn sip_reason(&self) -> Option<String>;
    fn sip_call_id(&self) -> Option<String>;

    /// Caller number for inbound calls, destination for outbound ones
    fn remote_number(&self) -> Option<String>;

    async fn answer(&self, options: AnswerOptions) -> Result<(), SdkError>;
    async fn hangup(&self) -> Result<(), SdkError>;
    async fn hold(&self) -> Result<(), SdkError>;
    async fn unhold(&self) -> Result<(), SdkError>;
    async fn dtmf(&self, digit: DtmfDigit) -> Result<(), SdkError>;

    fn toggle_audio_mute(&self) -> Result<(), SdkError>;
    fn is_audio_muted(&self) -> bool;

    fn local_stream(&self) -> Option<MediaStreamId>;
    fn remote_stream(&self) -> Option<MediaStreamId>;
}

// ---------------------------------------------------------------------------
// sipjs mode
// ---------------------------------------------------------------------------

/// Events of the SIP simple-user device
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    WsConnecting { attempts: u32 },
    WsConnected,
    WsDisconnected,
    Registered,
    Unregistered,
    RegistrationFailed { cause: String },
    IncomingInvite { call: Arc<dyn SipCall> },
    Message { body: String },
}

/// Events of a SIP call
#[derive(Debug, Clone, PartialEq)]
pub enum SipCallEvent {
    Connecting,
    Accepted,
    Terminated,
    Failed { cause: String },
    Rejected,
    Muted,
    Unmuted,
    Held,
    Resumed,
    /// Raw audio statistics
    Stats(StatsSample),
}

impl SipCallEvent {
    /// Raw state name used by the call-state table, `None` for events that
    /// carry no call status meaning
    pub fn raw_state(&self) -> Option<&'static str> {
        match self {
            Self::Connecting => Some("connecting"),
            Self::Accepted => Some("accepted"),
            Self::Terminated => Some("terminated"),
            Self::Failed { .. } => Some("failed"),
            Self::Rejected => Some("rejected"),
            Self::Held => Some("held"),
            Self::Resumed => Some("resumed"),
            Self::Muted | Self::Unmuted | Self::Stats(_) => None,
        }
    }
}

/// SIP.js style simple-user device
#[async_trait]
pub trait SipDevice: Send + Sync + Debug {
    async fn start_ws(&self) -> Result<(), SdkError>;
    async fn stop_ws(&self) -> Result<(), SdkError>;
    async fn register(&self, options: &RegisterOptions) -> Result<(), SdkError>;
    async fn unregister(&self, options: &RegisterOptions) -> Result<(), SdkError>;

    fn initiate_call(&self, destination: &str) -> Result<Arc<dyn SipCall>, SdkError>;

    fn subscribe(&self, listener: Listener<DeviceEvent>) -> Subscription;
}

/// Call handle of the SIP device
#[async_trait]
pub trait SipCall: Send + Sync + Debug {
    fn id(&self) -> CallId;
    fn is_incoming(&self) -> bool;
    fn remote_identity(&self) -> Option<String>;

    async fn accept(&self) -> Result<(), SdkError>;
    async fn reject(&self) -> Result<(), SdkError>;
    async fn disconnect(&self) -> Result<(), SdkError>;
    async fn hold(&self) -> Result<(), SdkError>;
    async fn unhold(&self) -> Result<(), SdkError>;
    async fn send_digits(&self, digits: &str) -> Result<(), SdkError>;
    async fn toggle_mute(&self, mute: bool) -> Result<(), SdkError>;

    fn is_muted(&self) -> bool;
    fn local_stream(&self) -> Option<MediaStreamId>;
    fn remote_stream(&self) -> Option<MediaStreamId>;

    fn subscribe(&self, listener: Listener<SipCallEvent>) -> Subscription;
}

// ---------------------------------------------------------------------------
// construction
// ---------------------------------------------------------------------------

/// The active client, tagged by the mode that built it
#[derive(Debug, Clone)]
pub enum ClientHandle {
    Sdk(Arc<dyn RtcClient>),
    SipJs(Arc<dyn SipDevice>),
}

impl ClientHandle {
    pub fn mode(&self) -> ClientMode {
        match self {
            Self::Sdk(_) => ClientMode::Sdk,
            Self::SipJs(_) => ClientMode::Sipjs,
        }
    }

    /// Whether two handles refer to the same client instance
    pub fn same_client(&self, other: &ClientHandle) -> bool {
        match (self, other) {
            (Self::Sdk(a), Self::Sdk(b)) => Arc::ptr_eq(a, b),
            (Self::SipJs(a), Self::SipJs(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Builds SDK clients from persisted options
///
/// Credential checks happen before the factory is called; the factory only
/// sees option sets that can plausibly authenticate.
pub trait ClientFactory: Send + Sync {
    fn create_rtc_client(&self, options: &ClientOptions) -> Result<Arc<dyn RtcClient>, SdkError>;

    fn create_sip_device(
        &self,
        options: &SimpleUserClientOptions,
    ) -> Result<Arc<dyn SipDevice>, SdkError>;
}
