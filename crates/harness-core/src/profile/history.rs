//! Call history entries

use serde::{Deserialize, Serialize};

use crate::sdk::RtcCall;
use crate::status::CallDirection;

/// Raw SDK states that mark a call as finished for history purposes
pub const HISTORY_STATES: [&str; 2] = ["hangup", "done"];

/// One finished call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHistoryEntry {
    pub id: String,
    /// Remote party: caller for inbound calls, destination for outbound ones
    pub destination_number: String,
    pub direction: CallDirection,
}

impl CallHistoryEntry {
    pub fn new(
        id: impl Into<String>,
        destination_number: impl Into<String>,
        direction: CallDirection,
    ) -> Self {
        Self {
            id: id.into(),
            destination_number: destination_number.into(),
            direction,
        }
    }

    /// Entry for an SDK call, if its state marks it as finished
    pub fn from_finished_call(call: &dyn RtcCall) -> Option<Self> {
        let state = call.state();
        if !HISTORY_STATES.contains(&state.trim()) {
            return None;
        }
        Some(Self::new(
            call.id(),
            call.remote_number().unwrap_or_default(),
            call.direction(),
        ))
    }
}

/// Put `entry` in front of `history` unless its id is already present
///
/// Returns whether the entry was added.
pub fn prepend_unique(history: &mut Vec<CallHistoryEntry>, entry: CallHistoryEntry) -> bool {
    if history.iter().any(|existing| existing.id == entry.id) {
        return false;
    }
    history.insert(0, entry);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_ignored_and_new_entries_go_first() {
        let mut history = Vec::new();
        assert!(prepend_unique(&mut history, CallHistoryEntry::new("a", "100", CallDirection::Outbound)));
        assert!(prepend_unique(&mut history, CallHistoryEntry::new("b", "200", CallDirection::Inbound)));
        assert!(!prepend_unique(&mut history, CallHistoryEntry::new("a", "999", CallDirection::Outbound)));

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, "b");
        assert_eq!(history[1].destination_number, "100");
    }

    #[test]
    fn serialized_with_stored_field_names() {
        let entry = CallHistoryEntry::new("a", "100", CallDirection::Inbound);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["destinationNumber"], "100");
        assert_eq!(json["direction"], "inbound");
    }
}
