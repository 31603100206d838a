//! Activity and signalling message feeds
//!
//! [`ActivityLog`] holds short human readable entries about call progress.
//! [`MessageLog`] holds raw signalling traffic as pretty-printed JSON. Both
//! are bounded and list newest entries first.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One activity entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded newest-first activity feed
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<ActivityEntry>>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, description: impl Into<String>) {
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            description: description.into(),
            timestamp: Utc::now(),
        };
        tracing::debug!(activity = %entry.description, "Activity");

        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Entry for a call state change, `Call State: <state> (<cause>)`
    pub fn push_call_state(&self, state: &str, cause: Option<&str>) {
        match cause {
            Some(cause) if !cause.is_empty() => self.push(format!("Call State: {state} ({cause})")),
            _ => self.push(format!("Call State: {state}")),
        }
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(200)
    }
}

/// One captured signalling message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: Uuid,
    /// Pretty-printed JSON, or the raw text for non-JSON traffic
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded newest-first signalling message feed
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: Arc<Mutex<VecDeque<MessageEntry>>>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Record a JSON payload from the socket
    pub fn push_json(&self, payload: &serde_json::Value) {
        let body = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        self.push_text(body);
    }

    /// Record a plain-text message, such as a SIP message body
    pub fn push_text(&self, body: impl Into<String>) {
        let entry = MessageEntry {
            id: Uuid::new_v4(),
            body: body.into(),
            timestamp: Utc::now(),
        };
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> Vec<MessageEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(200)
    }
}
