//! State trackers
//!
//! Trackers are the single writers of the derived state. Their listener
//! callbacks are the only code that mutates status; everything else reads
//! snapshots or subscribes to change broadcasts.

pub mod call;
pub mod connection;


use std::fmt;

pub use call::{CallNotification, CallStatusChange, CallTracker};
pub use connection::{ConnectionChange, ConnectionSnapshot, ConnectionTracker};

/// Result of a user-level action
///
/// Actions never return errors. A failure has already been reported as a
/// user notice by the time `Failed` is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Forwarded to the SDK, which accepted it
    Sent,
    /// No call is tracked, nothing was done
    NoActiveCall,
    /// No client is attached, nothing was done
    NoClient,
    /// Guarded action not valid in the current state
    NotAllowed { reason: String },
    /// The SDK rejected the action
    Failed { message: String },
}

impl ActionOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    pub fn not_allowed(reason: impl Into<String>) -> Self {
        Self::NotAllowed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::NoActiveCall => write!(f, "no active call"),
            Self::NoClient => write!(f, "no client"),
            Self::NotAllowed { reason } => write!(f, "not allowed: {reason}"),
            Self::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}
