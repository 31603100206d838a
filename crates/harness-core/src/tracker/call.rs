//! Call tracking
//!
//! [`CallTracker`] owns the single "current call" slot. It holds the call
//! handle weakly (the SDK owns call lifetime) and derives [`CallStatus`]
//! from call events through a [`CallStateTable`].
//!
//! # Status flow
//!
//! * A new call (SDK notification for an unknown id, SIP invite, or a placed
//!   call) replaces whatever was tracked and starts at `incoming` / `dialing`.
//! * Events move the status along [`transition_path`], which inserts
//!   `connecting` when an event jumps straight to `connected`.
//! * `ended` / `failed` clear the slot and schedule a reset to `idle` after
//!   the configured delay. A new call cancels a pending reset.
//!
//! # Actions
//!
//! [`CallTracker::answer`], [`CallTracker::hangup`] and friends forward to
//! the held handle and report an [`ActionOutcome`]. They never change the
//! status; the SDK confirms through events.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use super::ActionOutcome;
use crate::activity::ActivityLog;
use crate::dtmf::DtmfDigit;
use crate::error::SdkError;
use crate::media::{watch_media_streams, MediaStreams};
use crate::notify::Notifier;
use crate::sdk::{AnswerOptions, CallId, RtcCall, SipCall, SipCallEvent};
use crate::stats::StatsFrame;
use crate::status::{CallDirection, CallStatus};
use crate::subscription::{Listener, Subscription};
use crate::transitions::{transition_path, CallStatePolicy, CallStateTable};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// How many finished call ids are remembered to drop late updates
const FINISHED_CALL_MEMORY: usize = 16;

/// Published on every call status change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallStatusChange {
    pub call_id: Option<CallId>,
    pub direction: Option<CallDirection>,
    pub previous: CallStatus,
    pub current: CallStatus,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of the current call slot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CallNotification {
    pub call_id: Option<CallId>,
    pub direction: Option<CallDirection>,
    pub muted: bool,
}

impl CallNotification {
    pub fn is_empty(&self) -> bool {
        self.call_id.is_none()
    }
}

#[derive(Debug, Clone)]
enum CallRef {
    Sdk(Weak<dyn RtcCall>),
    SipJs(Weak<dyn SipCall>),
}

enum LiveCall {
    Sdk(Arc<dyn RtcCall>),
    SipJs(Arc<dyn SipCall>),
}

impl CallRef {
    fn upgrade(&self) -> Option<LiveCall> {
        match self {
            Self::Sdk(call) => call.upgrade().map(LiveCall::Sdk),
            Self::SipJs(call) => call.upgrade().map(LiveCall::SipJs),
        }
    }
}

#[derive(Debug)]
struct TrackedCall {
    id: CallId,
    direction: CallDirection,
    handle: CallRef,
    muted: bool,
}

#[derive(Debug, Default)]
struct CallState {
    status: CallStatus,
    call: Option<TrackedCall>,
    generation: u64,
    call_subscription: Option<Subscription>,
    reset_task: Option<AbortHandle>,
    finished: VecDeque<CallId>,
    last_error: Option<String>,
    stats: Option<StatsFrame>,
}

#[derive(Debug)]
struct CallInner {
    state: Mutex<CallState>,
    sdk_table: RwLock<CallStateTable>,
    sip_table: CallStateTable,
    reset_delay: Duration,
    media_poll_interval: Duration,
    notifier: Notifier,
    activity: ActivityLog,
    changes: broadcast::Sender<CallStatusChange>,
}

/// Tracks the single current call and derives its status
#[derive(Debug, Clone)]
pub struct CallTracker {
    inner: Arc<CallInner>,
}

impl CallTracker {
    pub fn new(
        reset_delay: Duration,
        media_poll_interval: Duration,
        notifier: Notifier,
        activity: ActivityLog,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(CallInner {
                state: Mutex::new(CallState::default()),
                sdk_table: RwLock::new(CallStateTable::sdk_standard()),
                sip_table: CallStateTable::sip_simple_user(),
                reset_delay,
                media_poll_interval,
                notifier,
                activity,
                changes,
            }),
        }
    }

    /// Use one of the built-in SDK tables
    pub fn set_policy(&self, policy: CallStatePolicy) {
        self.set_sdk_table(CallStateTable::for_policy(policy));
    }

    /// Use a custom table for SDK calls
    pub fn set_sdk_table(&self, table: CallStateTable) {
        tracing::debug!(table = table.name(), "Call state table selected");
        *self.inner.sdk_table.write() = table;
    }

    pub fn sdk_table_name(&self) -> String {
        self.inner.sdk_table.read().name().to_string()
    }

    pub fn status(&self) -> CallStatus {
        self.inner.state.lock().status
    }

    pub fn direction(&self) -> Option<CallDirection> {
        self.inner.state.lock().call.as_ref().map(|call| call.direction)
    }

    pub fn current_call_id(&self) -> Option<CallId> {
        self.inner.state.lock().call.as_ref().map(|call| call.id.clone())
    }

    pub fn notification(&self) -> CallNotification {
        let state = self.inner.state.lock();
        match &state.call {
            Some(call) => CallNotification {
                call_id: Some(call.id.clone()),
                direction: Some(call.direction),
                muted: call.muted,
            },
            None => CallNotification::default(),
        }
    }

    /// Reason of the last failed call
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    /// Latest quality frame of the current call
    ///
    /// Kept after the call ends until the next call starts.
    pub fn stats_frame(&self) -> Option<StatsFrame> {
        self.inner.state.lock().stats.clone()
    }

    /// Record a quality frame pushed by the SDK client
    ///
    /// Dropped when no call is tracked.
    pub fn handle_stats_frame(&self, frame: StatsFrame) {
        let mut state = self.inner.state.lock();
        Self::store_stats(&mut state, frame);
    }

    fn store_stats(state: &mut CallState, frame: StatsFrame) {
        let Some(call) = state.call.as_ref() else {
            tracing::trace!("Stats frame without a call dropped");
            return;
        };
        tracing::trace!(call_id = %call.id, mos = frame.mos, quality = %frame.quality, "Stats frame");
        state.stats = Some(frame);
    }

    /// Whether an idle-reset is scheduled
    pub fn reset_pending(&self) -> bool {
        self.inner.state.lock().reset_task.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallStatusChange> {
        self.inner.changes.subscribe()
    }

    // --- sdk calls ----------------------------------------------------------

    /// Feed a `callUpdate` notification from the SDK client
    ///
    /// Every update is written to the activity log, including updates the
    /// tracker then ignores.
    pub fn handle_sdk_update(&self, call: &Arc<dyn RtcCall>) {
        let id = call.id();
        let direction = call.direction();
        let raw = call.state();
        let cause = call.cause();
        let sip_reason = call.sip_reason().filter(|reason| !reason.is_empty());
        self.log_sdk_update(call.as_ref(), &raw, cause.as_deref(), sip_reason.as_deref());

        let target = self.inner.sdk_table.read().resolve(direction, &raw);
        let Some(target) = target else {
            tracing::warn!(call_id = %id, state = %raw, "Unmapped call state ignored");
            return;
        };

        let mut state = self.inner.state.lock();
        let tracked = state.call.as_ref().is_some_and(|tracked| tracked.id == id);
        if !tracked {
            if state.finished.contains(&id) {
                tracing::trace!(call_id = %id, state = %raw, "Update for finished call ignored");
                return;
            }
            if target.is_terminal() {
                tracing::debug!(call_id = %id, state = %raw, "Untracked call ended");
                remember_finished(&mut state, id);
                return;
            }
            self.begin(
                &mut state,
                id,
                direction,
                CallRef::Sdk(Arc::downgrade(call)),
                call.is_audio_muted(),
            );
        }

        let reason = cause.or(sip_reason);
        self.advance(&mut state, target, reason);
    }

    /// `Sip CallId` plus the state with the SIP reason when one is present,
    /// otherwise the state with the SDK cause
    fn log_sdk_update(
        &self,
        call: &dyn RtcCall,
        raw: &str,
        cause: Option<&str>,
        sip_reason: Option<&str>,
    ) {
        match sip_reason {
            Some(reason) => {
                let sip_call_id = call.sip_call_id().unwrap_or_else(|| "unknown".to_string());
                self.inner.activity.push(format!("Sip CallId: {sip_call_id}"));
                self.inner.activity.push_call_state(raw, Some(reason));
            }
            None => self.inner.activity.push_call_state(raw, cause),
        }
    }

    /// Start tracking an SDK call this client just placed
    pub fn track_sdk_call(&self, call: &Arc<dyn RtcCall>) {
        let id = call.id();
        let mut state = self.inner.state.lock();
        if state.call.as_ref().is_some_and(|tracked| tracked.id == id) {
            return;
        }
        self.begin(
            &mut state,
            id,
            call.direction(),
            CallRef::Sdk(Arc::downgrade(call)),
            call.is_audio_muted(),
        );
    }

    // --- sip calls ----------------------------------------------------------

    /// Start tracking a SIP call and attach its listeners
    ///
    /// Listeners of the previously tracked call are disposed first.
    pub fn track_sip_call(&self, call: Arc<dyn SipCall>, direction: CallDirection) {
        let id = call.id();
        let generation = {
            let mut state = self.inner.state.lock();
            self.begin(
                &mut state,
                id.clone(),
                direction,
                CallRef::SipJs(Arc::downgrade(&call)),
                call.is_muted(),
            );
            state.generation
        };

        let subscription = call.subscribe(self.sip_listener(generation));

        let mut state = self.inner.state.lock();
        if state.generation == generation && state.call.is_some() {
            state.call_subscription = Some(subscription);
            tracing::debug!(call_id = %id, direction = %direction, "SIP call listeners attached");
        } else {
            drop(state);
            subscription.dispose();
        }
    }

    fn sip_listener(&self, generation: u64) -> Listener<SipCallEvent> {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |event: &SipCallEvent| {
            if let Some(inner) = inner.upgrade() {
                CallTracker { inner }.handle_sip_event(generation, event);
            }
        })
    }

    fn handle_sip_event(&self, generation: u64, event: &SipCallEvent) {
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            tracing::debug!(event = ?event, "Event from replaced call ignored");
            return;
        }
        let Some(call) = state.call.as_mut() else {
            tracing::debug!(event = ?event, "Event after call finished ignored");
            return;
        };

        match event {
            SipCallEvent::Muted | SipCallEvent::Unmuted => {
                call.muted = matches!(event, SipCallEvent::Muted);
                tracing::info!(call_id = %call.id, muted = call.muted, "Call mute changed");
                return;
            }
            SipCallEvent::Stats(sample) => {
                Self::store_stats(&mut state, StatsFrame::from_sample(sample));
                return;
            }
            _ => tracing::info!(call_id = %call.id, event = ?event, "Call event"),
        }

        let direction = call.direction;
        let Some(raw) = event.raw_state() else {
            return;
        };
        let Some(target) = self.inner.sip_table.resolve(direction, raw) else {
            tracing::warn!(state = raw, "Unmapped SIP call event ignored");
            return;
        };
        let reason = match event {
            SipCallEvent::Failed { cause } => Some(cause.clone()),
            SipCallEvent::Rejected => Some("rejected".to_string()),
            _ => None,
        };
        self.advance(&mut state, target, reason);
    }

    // --- slot management ----------------------------------------------------

    fn begin(
        &self,
        state: &mut CallState,
        id: CallId,
        direction: CallDirection,
        handle: CallRef,
        muted: bool,
    ) {
        if let Some(previous) = state.call.take() {
            tracing::info!(previous = %previous.id, next = %id, "Replacing tracked call");
        }
        if let Some(subscription) = state.call_subscription.take() {
            subscription.dispose();
        }
        if let Some(task) = state.reset_task.take() {
            task.abort();
        }

        state.generation += 1;
        state.last_error = None;
        state.stats = None;
        state.call = Some(TrackedCall {
            id: id.clone(),
            direction,
            handle,
            muted,
        });
        tracing::info!(call_id = %id, direction = %direction, "Tracking call");
        self.set_status(state, direction.initial_status(), None);
    }

    fn advance(&self, state: &mut CallState, target: CallStatus, reason: Option<String>) {
        let path = transition_path(state.status, target);
        if path.is_empty() {
            if state.status != target {
                tracing::warn!(from = %state.status, to = %target, "Illegal call transition ignored");
            }
            return;
        }
        for step in path {
            self.set_status(state, step, reason.clone());
        }
        if target.is_terminal() {
            self.finish(state, target, reason);
        }
    }

    fn finish(&self, state: &mut CallState, status: CallStatus, reason: Option<String>) {
        if let Some(call) = state.call.take() {
            tracing::info!(call_id = %call.id, status = %status, reason = ?reason, "Call finished");
            remember_finished(state, call.id);
        }
        if let Some(subscription) = state.call_subscription.take() {
            subscription.dispose();
        }
        if status == CallStatus::Failed {
            let description = reason.unwrap_or_else(|| "unknown cause".to_string());
            self.inner.notifier.error("Call failed", description.clone());
            state.last_error = Some(description);
        }
        self.schedule_reset(state);
    }

    fn schedule_reset(&self, state: &mut CallState) {
        let delay = self.inner.reset_delay;
        if delay.is_zero() {
            self.set_status(state, CallStatus::Idle, None);
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.set_status(state, CallStatus::Idle, None);
            return;
        };

        let generation = state.generation;
        let inner = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                CallTracker { inner }.complete_reset(generation);
            }
        });
        state.reset_task = Some(task.abort_handle());
    }

    fn complete_reset(&self, generation: u64) {
        let mut state = self.inner.state.lock();
        if state.generation != generation || !state.status.is_terminal() {
            return;
        }
        state.reset_task = None;
        self.set_status(&mut state, CallStatus::Idle, None);
    }

    /// Forget the tracked call and return to idle immediately
    ///
    /// Used on mode switch and teardown. Events from the old call are
    /// ignored afterwards.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(task) = state.reset_task.take() {
            task.abort();
        }
        if let Some(subscription) = state.call_subscription.take() {
            subscription.dispose();
        }
        if let Some(call) = state.call.take() {
            tracing::debug!(call_id = %call.id, "Dropping tracked call");
            remember_finished(&mut state, call.id);
        }
        state.last_error = None;
        state.stats = None;
        self.set_status(&mut state, CallStatus::Idle, None);
    }

    fn set_status(&self, state: &mut CallState, next: CallStatus, reason: Option<String>) {
        if state.status == next {
            return;
        }
        let previous = state.status;
        state.status = next;
        tracing::debug!(from = %previous, to = %next, "Call status");

        let _ = self.inner.changes.send(CallStatusChange {
            call_id: state.call.as_ref().map(|call| call.id.clone()),
            direction: state.call.as_ref().map(|call| call.direction),
            previous,
            current: next,
            reason,
            timestamp: Utc::now(),
        });
    }

    // --- actions ------------------------------------------------------------

    fn live_call(&self) -> Option<(LiveCall, CallStatus)> {
        let state = self.inner.state.lock();
        let call = state.call.as_ref()?.handle.upgrade()?;
        Some((call, state.status))
    }

    fn outcome(&self, action: &str, result: Result<(), SdkError>) -> ActionOutcome {
        match result {
            Ok(()) => ActionOutcome::Sent,
            Err(e) => {
                tracing::warn!(action, error = %e, "Call action failed");
                self.inner
                    .notifier
                    .error(format!("Failed to {action}"), e.message.clone());
                ActionOutcome::Failed { message: e.message }
            }
        }
    }

    fn guard(action: &str, status: CallStatus, allowed: &[CallStatus]) -> Option<ActionOutcome> {
        if allowed.contains(&status) {
            None
        } else {
            tracing::debug!(action, status = %status, "Call action not allowed");
            Some(ActionOutcome::not_allowed(format!("cannot {action} while {status}")))
        }
    }

    /// Answer an incoming call
    pub async fn answer(&self, options: AnswerOptions) -> ActionOutcome {
        let Some((call, status)) = self.live_call() else {
            return ActionOutcome::NoActiveCall;
        };
        if let Some(outcome) = Self::guard("answer", status, &[CallStatus::Incoming]) {
            return outcome;
        }
        let result = match call {
            LiveCall::Sdk(call) => call.answer(options).await,
            LiveCall::SipJs(call) => call.accept().await,
        };
        self.outcome("answer", result)
    }

    /// Decline an incoming call
    pub async fn reject(&self) -> ActionOutcome {
        let Some((call, status)) = self.live_call() else {
            return ActionOutcome::NoActiveCall;
        };
        if let Some(outcome) = Self::guard("reject", status, &[CallStatus::Incoming]) {
            return outcome;
        }
        let result = match call {
            LiveCall::Sdk(call) => call.hangup().await,
            LiveCall::SipJs(call) => call.reject().await,
        };
        self.outcome("reject", result)
    }

    /// End the call in any live state
    pub async fn hangup(&self) -> ActionOutcome {
        let Some((call, status)) = self.live_call() else {
            return ActionOutcome::NoActiveCall;
        };
        if !status.is_active() {
            return ActionOutcome::NoActiveCall;
        }
        let result = match call {
            LiveCall::Sdk(call) => call.hangup().await,
            LiveCall::SipJs(call) => call.disconnect().await,
        };
        self.outcome("hang up", result)
    }

    pub async fn hold(&self) -> ActionOutcome {
        let Some((call, status)) = self.live_call() else {
            return ActionOutcome::NoActiveCall;
        };
        if let Some(outcome) = Self::guard("hold", status, &[CallStatus::Connected]) {
            return outcome;
        }
        let result = match call {
            LiveCall::Sdk(call) => call.hold().await,
            LiveCall::SipJs(call) => call.hold().await,
        };
        self.outcome("hold", result)
    }

    pub async fn unhold(&self) -> ActionOutcome {
        let Some((call, status)) = self.live_call() else {
            return ActionOutcome::NoActiveCall;
        };
        if let Some(outcome) = Self::guard("unhold", status, &[CallStatus::Held]) {
            return outcome;
        }
        let result = match call {
            LiveCall::Sdk(call) => call.unhold().await,
            LiveCall::SipJs(call) => call.unhold().await,
        };
        self.outcome("unhold", result)
    }

    /// Flip the microphone mute of the call
    pub async fn toggle_mute(&self) -> ActionOutcome {
        let Some((call, status)) = self.live_call() else {
            return ActionOutcome::NoActiveCall;
        };
        if let Some(outcome) =
            Self::guard("toggle mute", status, &[CallStatus::Connected, CallStatus::Held])
        {
            return outcome;
        }
        match call {
            LiveCall::Sdk(call) => {
                let result = call.toggle_audio_mute();
                if result.is_ok() {
                    // the SDK has no mute event, read the flag back
                    let muted = call.is_audio_muted();
                    if let Some(tracked) = self.inner.state.lock().call.as_mut() {
                        tracked.muted = muted;
                    }
                }
                self.outcome("toggle mute", result)
            }
            LiveCall::SipJs(call) => {
                let mute = !call.is_muted();
                let result = call.toggle_mute(mute).await;
                self.outcome("toggle mute", result)
            }
        }
    }

    /// Send one DTMF digit on a connected call
    pub async fn send_digit(&self, digit: char) -> ActionOutcome {
        let Some((call, status)) = self.live_call() else {
            return ActionOutcome::NoActiveCall;
        };
        let digit = match DtmfDigit::new(digit) {
            Ok(digit) => digit,
            Err(e) => {
                self.inner.notifier.error("Invalid DTMF digit", e.to_string());
                return ActionOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };
        if let Some(outcome) = Self::guard("send DTMF", status, &[CallStatus::Connected]) {
            return outcome;
        }
        let result = match call {
            LiveCall::Sdk(call) => call.dtmf(digit).await,
            LiveCall::SipJs(call) => call.send_digits(&digit.to_string()).await,
        };
        self.outcome("send DTMF", result)
    }

    // --- media --------------------------------------------------------------

    /// Watch the media streams of whatever call is current
    ///
    /// The poll stops when the subscription is disposed or no call is
    /// tracked any more.
    pub fn watch_media(&self, listener: Listener<MediaStreams>) -> Subscription {
        let inner = Arc::downgrade(&self.inner);
        let read_streams = move || {
            let inner = inner.upgrade()?;
            let tracker = CallTracker { inner };
            let (call, _) = tracker.live_call()?;
            Some(match call {
                LiveCall::Sdk(call) => MediaStreams {
                    local: call.local_stream(),
                    remote: call.remote_stream(),
                },
                LiveCall::SipJs(call) => MediaStreams {
                    local: call.local_stream(),
                    remote: call.remote_stream(),
                },
            })
        };
        watch_media_streams(read_streams, self.inner.media_poll_interval, listener)
    }
}

fn remember_finished(state: &mut CallState, id: CallId) {
    if state.finished.contains(&id) {
        return;
    }
    if state.finished.len() == FINISHED_CALL_MEMORY {
        state.finished.pop_front();
    }
    state.finished.push_back(id);
}
