//! Harness configuration
//!
//! [`HarnessConfig`] carries the tunables of the state core. Everything has
//! a sensible default, so most callers only touch one or two fields through
//! the `with_*` builder methods:
//!
//! ```rust
//! use std::time::Duration;
//! use rtc_harness_core::session::HarnessConfig;
//! use rtc_harness_core::transitions::CallStatePolicy;
//!
//! let config = HarnessConfig::new()
//!     .with_reset_delay(Duration::ZERO)
//!     .with_call_state_policy(CallStatePolicy::KeepAlive)
//!     .with_rtc_host("wss://rtcdev.example.com");
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Call state policy
//!
//! When no policy is set, the SDK table follows the
//! `keepConnectionAliveOnSocketClose` flag of the current client options.

use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};
use crate::media::DEFAULT_POLL_INTERVAL;
use crate::transitions::CallStatePolicy;

/// Delay before a finished call resets to idle
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(1000);

/// Tunables of a [`crate::session::Harness`]
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// How long `ended` / `failed` stay visible before `idle`
    pub reset_delay: Duration,
    /// Period of the media stream poll
    pub media_poll_interval: Duration,
    /// Fixed SDK call-state policy, or `None` to follow the client options
    pub call_state_policy: Option<CallStatePolicy>,
    /// Start the SIP WebSocket as soon as the device is attached
    pub sip_auto_connect: bool,
    /// Signalling host handed to the SDK client
    pub rtc_host: Option<String>,
    /// User notices kept for late readers
    pub notice_capacity: usize,
    /// Activity entries kept
    pub activity_capacity: usize,
    /// Signalling messages kept
    pub message_log_capacity: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            reset_delay: DEFAULT_RESET_DELAY,
            media_poll_interval: DEFAULT_POLL_INTERVAL,
            call_state_policy: None,
            sip_auto_connect: true,
            rtc_host: None,
            notice_capacity: 50,
            activity_capacity: 200,
            message_log_capacity: 200,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    pub fn with_media_poll_interval(mut self, interval: Duration) -> Self {
        self.media_poll_interval = interval;
        self
    }

    pub fn with_call_state_policy(mut self, policy: CallStatePolicy) -> Self {
        self.call_state_policy = Some(policy);
        self
    }

    pub fn with_sip_auto_connect(mut self, enabled: bool) -> Self {
        self.sip_auto_connect = enabled;
        self
    }

    pub fn with_rtc_host(mut self, host: impl Into<String>) -> Self {
        self.rtc_host = Some(host.into());
        self
    }

    pub fn with_notice_capacity(mut self, capacity: usize) -> Self {
        self.notice_capacity = capacity;
        self
    }

    pub fn with_activity_capacity(mut self, capacity: usize) -> Self {
        self.activity_capacity = capacity;
        self
    }

    pub fn with_message_log_capacity(mut self, capacity: usize) -> Self {
        self.message_log_capacity = capacity;
        self
    }

    /// Check the configuration for values the harness cannot run with
    pub fn validate(&self) -> HarnessResult<()> {
        if self.media_poll_interval.is_zero() {
            return Err(HarnessError::config("media poll interval must be greater than zero"));
        }
        if self.notice_capacity == 0 || self.activity_capacity == 0 || self.message_log_capacity == 0 {
            return Err(HarnessError::config("log capacities must be greater than zero"));
        }
        if let Some(host) = &self.rtc_host {
            if host.trim().is_empty() {
                return Err(HarnessError::config("rtc host must not be empty"));
            }
        }
        Ok(())
    }
}
