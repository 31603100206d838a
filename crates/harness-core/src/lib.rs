//! # RTC Harness Core - calling state for a WebRTC / SIP test harness
//!
//! This crate is the state core of a calling test harness that drives two
//! calling SDKs: a full WebRTC SDK (`sdk` mode) and a SIP.js style simple-user
//! device (`sipjs` mode), plus an embedded AI agent widget (`aiagent` mode).
//! The SDKs themselves live behind the traits in [`sdk`]; this crate turns
//! their raw events into three small state machines and a view tag:
//!
//! - **Connection**: idle → connecting → registering → connected / disconnected
//! - **Registration** (SIP device): unregistered ⇄ registering → registered
//! - **Call**: idle → incoming / dialing → connecting → connected ⇄ held →
//!   ended / failed → idle
//!
//! ## Quick Start
//!
//! ```rust
//! use rtc_harness_core::mock::MockClientFactory;
//! use rtc_harness_core::profile::ClientOptions;
//! use rtc_harness_core::sdk::RtcClientEvent;
//! use rtc_harness_core::{CallView, ConnectionStatus, Harness};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = MockClientFactory::new();
//! let harness = Harness::builder().factory(factory.clone()).build()?;
//! harness
//!     .store()
//!     .set_current_options(&ClientOptions::with_credentials("alice", "secret"))?;
//!
//! harness.start().await;
//! let client = factory.last_rtc_client().expect("client built");
//! client.emit(RtcClientEvent::Ready);
//! assert_eq!(harness.connection().status(), ConnectionStatus::Connected);
//!
//! client.incoming_call("call-1", "+15550100");
//! assert_eq!(harness.current_view(), CallView::IncomingCall);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`session::Harness`] is the injected container. It builds the client
//!   for the active mode through a [`sdk::ClientFactory`] and wires its
//!   events into the trackers.
//! - [`tracker::ConnectionTracker`] and [`tracker::CallTracker`] are the
//!   only writers of derived state. Call states are resolved through a
//!   [`transitions::CallStateTable`].
//! - [`view::select_view`] is a pure function of the derived state.
//! - [`profile::ProfileStore`] persists options, profiles and call history
//!   with merge-on-read defaults.
//!
//! Nothing in this crate returns an error from a user action. Failures turn
//! into status changes or [`notify::UserNotice`]s.

pub mod activity;
pub mod agent;
pub mod dtmf;
pub mod error;
pub mod media;
pub mod notify;
pub mod profile;
pub mod sdk;
pub mod session;
pub mod stats;
pub mod status;
pub mod subscription;
pub mod tracker;
pub mod transitions;
pub mod view;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export main types
pub use error::{HarnessError, HarnessResult, SdkError};
pub use notify::{NoticeLevel, Notifier, UserNotice};
pub use session::{Harness, HarnessBuilder, HarnessConfig, HarnessSnapshot};
pub use stats::{CallQuality, StatsFrame};
pub use status::{CallDirection, CallStatus, ClientMode, ConnectionStatus, RegistrationStatus};
pub use subscription::{Listener, ListenerRegistry, Subscription};
pub use tracker::{ActionOutcome, CallNotification, CallTracker, ConnectionTracker};
pub use transitions::{CallStatePolicy, CallStateTable};
pub use view::{select_view, CallView};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
