//! Call-state transition tables
//!
//! Raw SDK call states are mapped onto [`CallStatus`] by data, not by
//! branching in the trackers. A table entry is keyed by the raw state and
//! optionally by call direction; direction-specific entries win over
//! direction-agnostic ones.
//!
//! Three built-in tables exist:
//!
//! | table | used for |
//! |-------|----------|
//! | [`CallStateTable::sdk_standard`] | SDK calls |
//! | [`CallStateTable::sdk_keep_alive`] | SDK calls with `keepConnectionAliveOnSocketClose` |
//! | [`CallStateTable::sip_simple_user`] | SIP device call events |
//!
//! # Examples
//!
//! ```rust
//! use rtc_harness_core::status::{CallDirection, CallStatus};
//! use rtc_harness_core::transitions::CallStateTable;
//!
//! let table = CallStateTable::sdk_standard();
//! assert_eq!(table.resolve(CallDirection::Inbound, "ringing"), Some(CallStatus::Incoming));
//! assert_eq!(table.resolve(CallDirection::Outbound, "ringing"), Some(CallStatus::Connecting));
//! assert_eq!(table.resolve(CallDirection::Outbound, "bogus"), None);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::status::{CallDirection, CallStatus};

/// Which SDK table applies to calls of the full SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatePolicy {
    #[default]
    Standard,
    /// Calls survive socket loss; outbound `ringing` and `recovering` count as live
    KeepAlive,
}

/// Mapping `(direction, raw state) -> CallStatus`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStateTable {
    name: String,
    entries: HashMap<(Option<CallDirection>, String), CallStatus>,
}

impl CallStateTable {
    /// Empty table with a descriptive name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Table for calls of the full SDK
    pub fn sdk_standard() -> Self {
        use CallDirection::*;
        use CallStatus::*;

        Self::new("sdk-standard")
            .with_mapping(Some(Inbound), "new", Incoming)
            .with_mapping(Some(Outbound), "new", Dialing)
            .with_mapping(None, "requesting", Dialing)
            .with_mapping(None, "trying", Connecting)
            .with_mapping(None, "early", Connecting)
            .with_mapping(None, "answering", Connecting)
            .with_mapping(None, "recovering", Connecting)
            .with_mapping(Some(Inbound), "ringing", Incoming)
            .with_mapping(Some(Outbound), "ringing", Connecting)
            .with_mapping(None, "active", Connected)
            .with_mapping(None, "held", Held)
            .with_mapping(None, "hangup", Ended)
            .with_mapping(None, "destroy", Ended)
            .with_mapping(None, "purge", Ended)
            .with_mapping(None, "done", Ended)
    }

    /// SDK table when calls are kept alive across socket loss
    pub fn sdk_keep_alive() -> Self {
        use CallDirection::*;
        use CallStatus::*;

        let mut table = Self::sdk_standard()
            .with_mapping(Some(Outbound), "ringing", Connected)
            .with_mapping(None, "recovering", Connected);
        table.name = "sdk-keep-alive".to_string();
        table
    }

    /// Table for SIP device call events
    pub fn sip_simple_user() -> Self {
        use CallStatus::*;

        Self::new("sip-simple-user")
            .with_mapping(None, "connecting", Connecting)
            .with_mapping(None, "accepted", Connected)
            .with_mapping(None, "resumed", Connected)
            .with_mapping(None, "held", Held)
            .with_mapping(None, "terminated", Ended)
            .with_mapping(None, "rejected", Ended)
            .with_mapping(None, "failed", Failed)
    }

    /// Built-in SDK table for a policy
    pub fn for_policy(policy: CallStatePolicy) -> Self {
        match policy {
            CallStatePolicy::Standard => Self::sdk_standard(),
            CallStatePolicy::KeepAlive => Self::sdk_keep_alive(),
        }
    }

    /// Add or replace an entry; `None` applies to both directions
    pub fn with_mapping(
        mut self,
        direction: Option<CallDirection>,
        raw_state: &str,
        status: CallStatus,
    ) -> Self {
        self.entries
            .insert((direction, normalize(raw_state)), status);
        self
    }

    /// Resolve a raw state; `None` when the table has no entry
    pub fn resolve(&self, direction: CallDirection, raw_state: &str) -> Option<CallStatus> {
        let raw = normalize(raw_state);
        self.entries
            .get(&(Some(direction), raw.clone()))
            .or_else(|| self.entries.get(&(None, raw)))
            .copied()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for CallStateTable {
    fn default() -> Self {
        Self::sdk_standard()
    }
}

fn normalize(raw_state: &str) -> String {
    raw_state.trim().to_ascii_lowercase()
}

/// Steps from `from` to `to` that never skip `connecting`
///
/// Returns the intermediate and final statuses to apply in order, or an
/// empty list when `to` cannot be reached legally (or equals `from`).
pub fn transition_path(from: CallStatus, to: CallStatus) -> Vec<CallStatus> {
    use CallStatus::*;

    if from == to {
        return Vec::new();
    }
    if from.can_transition_to(to) {
        return vec![to];
    }
    match (from, to) {
        (Incoming | Dialing, Connected) => vec![Connecting, Connected],
        (Incoming | Dialing, Held) => vec![Connecting, Connected, Held],
        (Connecting, Held) => vec![Connected, Held],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CallDirection::*;

    #[test]
    fn ringing_depends_on_direction() {
        let standard = CallStateTable::sdk_standard();
        assert_eq!(standard.resolve(Inbound, "ringing"), Some(CallStatus::Incoming));
        assert_eq!(standard.resolve(Outbound, "ringing"), Some(CallStatus::Connecting));

        let keep_alive = CallStateTable::sdk_keep_alive();
        assert_eq!(keep_alive.resolve(Inbound, "ringing"), Some(CallStatus::Incoming));
        assert_eq!(keep_alive.resolve(Outbound, "ringing"), Some(CallStatus::Connected));
        assert_eq!(keep_alive.resolve(Outbound, "recovering"), Some(CallStatus::Connected));
        assert_eq!(keep_alive.name(), "sdk-keep-alive");
    }

    #[test]
    fn raw_states_are_normalized() {
        let table = CallStateTable::sdk_standard();
        assert_eq!(table.resolve(Outbound, "Requesting "), Some(CallStatus::Dialing));
        assert_eq!(table.resolve(Outbound, "ACTIVE"), Some(CallStatus::Connected));
    }

    #[test]
    fn every_terminal_sdk_state_ends_the_call() {
        let table = CallStateTable::sdk_standard();
        for raw in ["hangup", "destroy", "purge", "done"] {
            assert_eq!(table.resolve(Inbound, raw), Some(CallStatus::Ended), "{raw}");
        }
    }

    #[test]
    fn sip_table_covers_call_events() {
        let table = CallStateTable::sip_simple_user();
        assert_eq!(table.resolve(Inbound, "accepted"), Some(CallStatus::Connected));
        assert_eq!(table.resolve(Outbound, "rejected"), Some(CallStatus::Ended));
        assert_eq!(table.resolve(Outbound, "failed"), Some(CallStatus::Failed));
        assert_eq!(table.resolve(Outbound, "muted"), None);
    }

    #[test]
    fn overrides_replace_builtin_entries() {
        let table = CallStateTable::sdk_standard().with_mapping(
            Some(Outbound),
            "early",
            CallStatus::Connected,
        );
        assert_eq!(table.resolve(Outbound, "early"), Some(CallStatus::Connected));
        assert_eq!(table.resolve(Inbound, "early"), Some(CallStatus::Connecting));
    }

    #[test]
    fn paths_step_through_connecting() {
        use CallStatus::*;
        assert_eq!(transition_path(Incoming, Connected), vec![Connecting, Connected]);
        assert_eq!(transition_path(Dialing, Held), vec![Connecting, Connected, Held]);
        assert_eq!(transition_path(Connecting, Connected), vec![Connected]);
        assert_eq!(transition_path(Connected, Connected), Vec::<CallStatus>::new());
        assert!(transition_path(Idle, Connected).is_empty());
        assert!(transition_path(Ended, Held).is_empty());
    }
}
