//! User-visible notices
//!
//! The toast side channel. Action failures and registration problems are
//! reported here instead of being returned as errors. Notices are broadcast
//! to subscribers and the most recent ones are kept for late readers.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// One transient notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNotice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Broadcasts [`UserNotice`]s and remembers the latest few
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<UserNotice>,
    recent: Arc<Mutex<VecDeque<UserNotice>>>,
    capacity: usize,
}

impl Notifier {
    /// Create a notifier keeping up to `capacity` notices
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn info(&self, title: impl Into<String>) {
        self.publish(NoticeLevel::Info, title.into(), None);
    }

    pub fn error(&self, title: impl Into<String>, description: impl Into<String>) {
        self.publish(NoticeLevel::Error, title.into(), Some(description.into()));
    }

    fn publish(&self, level: NoticeLevel, title: String, description: Option<String>) {
        match level {
            NoticeLevel::Info => tracing::info!(notice = %title, "User notice"),
            NoticeLevel::Error => {
                tracing::warn!(notice = %title, description = ?description, "User error notice")
            }
        }

        let notice = UserNotice {
            level,
            title,
            description,
            timestamp: Utc::now(),
        };

        {
            let mut recent = self.recent.lock();
            if recent.len() == self.capacity {
                recent.pop_back();
            }
            recent.push_front(notice.clone());
        }

        // No subscribers is fine; the notice is still kept in `recent`
        let _ = self.sender.send(notice);
    }

    /// Subscribe to future notices
    pub fn subscribe(&self) -> broadcast::Receiver<UserNotice> {
        self.sender.subscribe()
    }

    /// Kept notices, newest first
    pub fn recent(&self) -> Vec<UserNotice> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Most recent notice, if any
    pub fn latest(&self) -> Option<UserNotice> {
        self.recent.lock().front().cloned()
    }

    pub fn clear(&self) {
        self.recent.lock().clear();
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(50)
    }
}
