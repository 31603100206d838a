//! Media stream handle watching
//!
//! Call handles expose their local and remote streams as plain fields with
//! no change event. [`watch_media_streams`] polls them at a fixed interval
//! and reports changes through an ordinary listener, so consumers cannot
//! tell it apart from a pushed event. The returned [`Subscription`] stops the
//! poll task.

use std::time::Duration;

use crate::sdk::MediaStreamId;
use crate::subscription::{Listener, Subscription};

/// Default poll period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Local and remote stream handles of a call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaStreams {
    pub local: Option<MediaStreamId>,
    pub remote: Option<MediaStreamId>,
}

impl MediaStreams {
    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.remote.is_none()
    }
}

/// Poll `read_streams` every `interval` and call `listener` when the result changes
///
/// The current value is delivered immediately. Polling ends when the
/// subscription is disposed or `read_streams` returns `None` (the call is gone).
/// Outside a tokio runtime only the initial value is delivered.
pub fn watch_media_streams<F>(
    read_streams: F,
    interval: Duration,
    listener: Listener<MediaStreams>,
) -> Subscription
where
    F: Fn() -> Option<MediaStreams> + Send + Sync + 'static,
{
    let Some(initial) = read_streams() else {
        return Subscription::empty();
    };
    listener(&initial);

    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("No tokio runtime; media streams will not be polled");
        return Subscription::empty();
    };

    let period = interval.max(Duration::from_millis(1));
    let task = runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // first tick completes immediately
        ticker.tick().await;
        let mut last = initial;

        loop {
            ticker.tick().await;
            let Some(current) = read_streams() else {
                tracing::debug!("Call gone, media stream polling stopped");
                break;
            };
            if current != last {
                tracing::debug!(local = ?current.local, remote = ?current.remote, "Media streams changed");
                listener(&current);
                last = current;
            }
        }
    });

    Subscription::new(move || task.abort())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<MediaStreams>>>, Listener<MediaStreams>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Arc::new(move |streams: &MediaStreams| sink.lock().push(streams.clone())))
    }

    #[tokio::test(start_paused = true)]
    async fn reports_only_changes() {
        let current = Arc::new(Mutex::new(Some(MediaStreams::default())));
        let source = current.clone();
        let (seen, listener) = recorder();

        let subscription =
            watch_media_streams(move || source.lock().clone(), DEFAULT_POLL_INTERVAL, listener);
        assert_eq!(seen.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(seen.lock().len(), 1);

        *current.lock() = Some(MediaStreams {
            local: Some(MediaStreamId::new("local-1")),
            remote: Some(MediaStreamId::new("remote-1")),
        });
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(seen.lock()[1].remote, Some(MediaStreamId::new("remote-1")));

        subscription.dispose();
        *current.lock() = Some(MediaStreams::default());
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_the_call_disappears() {
        let current = Arc::new(Mutex::new(Some(MediaStreams::default())));
        let source = current.clone();
        let (seen, listener) = recorder();

        let _subscription =
            watch_media_streams(move || source.lock().clone(), DEFAULT_POLL_INTERVAL, listener);
        *current.lock() = None;
        tokio::time::sleep(Duration::from_millis(600)).await;

        *current.lock() = Some(MediaStreams {
            local: Some(MediaStreamId::new("late")),
            remote: None,
        });
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn without_runtime_only_the_initial_value_is_seen() {
        let (seen, listener) = recorder();
        let subscription = watch_media_streams(|| Some(MediaStreams::default()), DEFAULT_POLL_INTERVAL, listener);
        assert_eq!(seen.lock().len(), 1);
        assert!(!subscription.is_active());
    }
}
