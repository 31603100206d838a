//! View selection
//!
//! [`select_view`] is a pure function of the derived state. It never fails:
//! combinations that cannot be reached through the trackers simply resolve
//! to [`CallView::None`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::{CallDirection, CallStatus, ClientMode, ConnectionStatus};

/// Which call view the presentation layer should render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallView {
    #[default]
    None,
    IncomingCall,
    ConnectingCall,
    ActiveCall,
    HeldCall,
}

impl CallView {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::IncomingCall => "incoming-call",
            Self::ConnectingCall => "connecting-call",
            Self::ActiveCall => "active-call",
            Self::HeldCall => "held-call",
        }
    }
}

impl fmt::Display for CallView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the call view for the current state
///
/// `direction` is the direction of the tracked call, `None` when no call is
/// tracked.
///
/// # Examples
///
/// ```rust
/// use rtc_harness_core::status::*;
/// use rtc_harness_core::view::{select_view, CallView};
///
/// let view = select_view(
///     ClientMode::Sdk,
///     ConnectionStatus::Connected,
///     CallStatus::Incoming,
///     Some(CallDirection::Inbound),
/// );
/// assert_eq!(view, CallView::IncomingCall);
///
/// // No call tracked: nothing to show, whatever the status says
/// let view = select_view(ClientMode::Sdk, ConnectionStatus::Connected, CallStatus::Connected, None);
/// assert_eq!(view, CallView::None);
/// ```
pub fn select_view(
    mode: ClientMode,
    connection: ConnectionStatus,
    call_status: CallStatus,
    direction: Option<CallDirection>,
) -> CallView {
    if mode == ClientMode::Aiagent || connection == ConnectionStatus::Idle {
        return CallView::None;
    }
    let Some(direction) = direction else {
        return CallView::None;
    };

    match (call_status, direction) {
        (CallStatus::Incoming, CallDirection::Inbound) => CallView::IncomingCall,
        (CallStatus::Dialing | CallStatus::Connecting, _) => CallView::ConnectingCall,
        (CallStatus::Connected, _) => CallView::ActiveCall,
        (CallStatus::Held, _) => CallView::HeldCall,
        _ => CallView::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [ClientMode; 3] = [ClientMode::Sdk, ClientMode::Sipjs, ClientMode::Aiagent];
    const CONNECTIONS: [ConnectionStatus; 5] = [
        ConnectionStatus::Idle,
        ConnectionStatus::Connecting,
        ConnectionStatus::Registering,
        ConnectionStatus::Connected,
        ConnectionStatus::Disconnected,
    ];
    const CALLS: [CallStatus; 8] = [
        CallStatus::Idle,
        CallStatus::Incoming,
        CallStatus::Dialing,
        CallStatus::Connecting,
        CallStatus::Connected,
        CallStatus::Held,
        CallStatus::Ended,
        CallStatus::Failed,
    ];

    #[test]
    fn idle_call_without_handle_is_always_none() {
        for mode in MODES {
            for connection in CONNECTIONS {
                assert_eq!(
                    select_view(mode, connection, CallStatus::Idle, None),
                    CallView::None
                );
            }
        }
    }

    #[test]
    fn missing_call_handle_always_resolves_to_none() {
        for mode in MODES {
            for connection in CONNECTIONS {
                for status in CALLS {
                    assert_eq!(select_view(mode, connection, status, None), CallView::None);
                }
            }
        }
    }

    #[test]
    fn selection_is_deterministic() {
        for status in CALLS {
            for direction in [CallDirection::Inbound, CallDirection::Outbound] {
                let first = select_view(ClientMode::Sipjs, ConnectionStatus::Connected, status, Some(direction));
                let second = select_view(ClientMode::Sipjs, ConnectionStatus::Connected, status, Some(direction));
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn call_views_for_live_calls() {
        let connected = ConnectionStatus::Connected;
        let out = Some(CallDirection::Outbound);
        assert_eq!(select_view(ClientMode::Sdk, connected, CallStatus::Dialing, out), CallView::ConnectingCall);
        assert_eq!(select_view(ClientMode::Sdk, connected, CallStatus::Connected, out), CallView::ActiveCall);
        assert_eq!(select_view(ClientMode::Sdk, connected, CallStatus::Held, out), CallView::HeldCall);
        // an outbound call is never presented as incoming
        assert_eq!(select_view(ClientMode::Sdk, connected, CallStatus::Incoming, out), CallView::None);
        assert_eq!(select_view(ClientMode::Sdk, connected, CallStatus::Ended, out), CallView::None);
    }

    #[test]
    fn ai_agent_mode_has_no_call_views() {
        for status in CALLS {
            assert_eq!(
                select_view(ClientMode::Aiagent, ConnectionStatus::Connected, status, Some(CallDirection::Inbound)),
                CallView::None
            );
        }
    }

    #[test]
    fn calls_survive_socket_loss_in_the_view() {
        assert_eq!(
            select_view(ClientMode::Sdk, ConnectionStatus::Disconnected, CallStatus::Connected, Some(CallDirection::Inbound)),
            CallView::ActiveCall
        );
    }
}
