//! UI-facing status enums
//!
//! These are the values presentation code reads. Each is owned by exactly one
//! tracker and only changes in response to SDK events.
//!
//! ```text
//!            ┌──────────┐
//!   idle ───►│ incoming │───┐
//!     │      └──────────┘   │    ┌────────────┐    ┌───────────┐
//!     │      ┌──────────┐   ├───►│ connecting │───►│ connected │◄──┐
//!     └─────►│ dialing  │───┘    └────────────┘    └───────────┘   │
//!            └──────────┘                            │      ▲      │
//!                                                    ▼      │      │
//!   any non-terminal ──► ended | failed ──► idle   ┌────────┴──┐   │
//!                                                  │   held    │───┘
//!                                                  └───────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Transport / client connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No client attached
    #[default]
    Idle,
    /// Connect requested, waiting for the transport
    Connecting,
    /// Transport open, waiting for the client to become ready
    Registering,
    /// Client ready (SDK) or WebSocket up (SIP device)
    Connected,
    /// Transport closed or failed
    Disconnected,
}

impl ConnectionStatus {
    /// Check whether calls may be placed on this connection
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Lowercase name as shown in status displays
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Registering => "registering",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SIP registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    Idle,
    Unregistered,
    Registering,
    Registered,
}

impl RegistrationStatus {
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Unregistered => "unregistered",
            Self::Registering => "registering",
            Self::Registered => "registered",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the single tracked call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// No call tracked
    #[default]
    Idle,
    /// Inbound call ringing locally
    Incoming,
    /// Outbound call placed, not yet progressing
    Dialing,
    /// Media / signalling being established
    Connecting,
    /// Call answered and active
    Connected,
    /// Active call on hold (sub-state of connected)
    Held,
    /// Call finished normally
    Ended,
    /// Call failed
    Failed,
}

impl CallStatus {
    /// Ended or failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }

    /// A call is in progress
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Incoming | Self::Dialing | Self::Connecting | Self::Connected | Self::Held
        )
    }

    /// A new outbound call may only start from idle or a terminal state
    pub fn can_place_call(&self) -> bool {
        matches!(self, Self::Idle | Self::Ended | Self::Failed)
    }

    /// Whether `next` is a legal single step from this status
    ///
    /// Self-transitions are not steps and return `false`.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;
        match (*self, next) {
            (Idle, Incoming | Dialing) => true,
            (Incoming | Dialing, Connecting | Ended | Failed) => true,
            (Connecting, Connected | Ended | Failed) => true,
            (Connected, Held | Ended | Failed) => true,
            (Held, Connected | Ended | Failed) => true,
            (Ended | Failed, Idle | Incoming | Dialing) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Incoming => "incoming",
            Self::Dialing => "dialing",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Held => "held",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a call relative to this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    /// Status a freshly tracked call starts in
    pub fn initial_status(&self) -> CallStatus {
        match self {
            Self::Inbound => CallStatus::Incoming,
            Self::Outbound => CallStatus::Dialing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which client implementation and view family is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    /// Full WebRTC SDK client
    #[default]
    Sdk,
    /// SIP.js style simple user device
    Sipjs,
    /// Embedded AI agent widget, no calling client
    Aiagent,
}

impl ClientMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Sipjs => "sipjs",
            Self::Aiagent => "aiagent",
        }
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sdk" => Ok(Self::Sdk),
            "sipjs" => Ok(Self::Sipjs),
            "aiagent" => Ok(Self::Aiagent),
            other => Err(HarnessError::config(format!("unknown client mode '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_cannot_jump_to_connected() {
        assert!(!CallStatus::Incoming.can_transition_to(CallStatus::Connected));
        assert!(!CallStatus::Dialing.can_transition_to(CallStatus::Connected));
        assert!(CallStatus::Incoming.can_transition_to(CallStatus::Connecting));
    }

    #[test]
    fn held_only_from_connected() {
        assert!(CallStatus::Connected.can_transition_to(CallStatus::Held));
        assert!(!CallStatus::Connecting.can_transition_to(CallStatus::Held));
        assert!(CallStatus::Held.can_transition_to(CallStatus::Connected));
    }

    #[test]
    fn terminal_states_allow_a_new_call() {
        for terminal in [CallStatus::Ended, CallStatus::Failed] {
            assert!(terminal.is_terminal());
            assert!(terminal.can_place_call());
            assert!(terminal.can_transition_to(CallStatus::Idle));
            assert!(terminal.can_transition_to(CallStatus::Dialing));
        }
        assert!(!CallStatus::Connected.can_place_call());
    }

    #[test]
    fn client_mode_round_trips_through_its_name() {
        for mode in [ClientMode::Sdk, ClientMode::Sipjs, ClientMode::Aiagent] {
            assert_eq!(mode.as_str().parse::<ClientMode>().unwrap(), mode);
        }
        assert!("teams".parse::<ClientMode>().is_err());
        assert_eq!(
            serde_json::to_string(&ClientMode::Sipjs).unwrap(),
            "\"sipjs\""
        );
    }
}
