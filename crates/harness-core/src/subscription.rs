//! Subscription handles and listener registries
//!
//! Every "attach listeners" operation in the harness yields exactly one
//! [`Subscription`]. Disposing it (explicitly or by dropping it) runs its
//! cleanup exactly once. [`ListenerRegistry`] is the emitter side: SDK
//! adapters and the in-memory mocks use it to hand out subscriptions.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use rtc_harness_core::subscription::ListenerRegistry;
//!
//! let registry: ListenerRegistry<u32> = ListenerRegistry::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//! let subscription = registry.subscribe(Arc::new(move |value: &u32| {
//!     counter.fetch_add(*value as usize, Ordering::SeqCst);
//! }));
//!
//! registry.emit(&2);
//! subscription.dispose();
//! registry.emit(&5);
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// Callback invoked for every event a registry emits
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Single disposer for one attach
pub struct Subscription {
    id: Uuid,
    cleanup: Option<Cleanup>,
}

impl Subscription {
    /// Create a subscription that runs `cleanup` when disposed
    pub fn new(cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self::with_id(Uuid::new_v4(), cleanup)
    }

    /// Create a subscription with a known identifier
    pub fn with_id(id: Uuid, cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// Subscription with nothing to clean up
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            cleanup: None,
        }
    }

    /// Fold several subscriptions into one disposer
    ///
    /// Parts are disposed in the order given.
    pub fn combine(parts: impl IntoIterator<Item = Subscription>) -> Self {
        let parts: Vec<Subscription> = parts.into_iter().collect();
        Self::new(move || {
            for part in parts {
                part.dispose();
            }
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether cleanup has yet to run
    pub fn is_active(&self) -> bool {
        self.cleanup.is_some()
    }

    /// Run the cleanup now
    pub fn dispose(mut self) {
        self.run_cleanup();
    }

    fn run_cleanup(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Listener list with subscribe / emit
///
/// Emission works on a snapshot of the listener list, so a listener may
/// dispose its own (or another) subscription while being called without
/// deadlocking. A listener removed during an emit can still see that one
/// in-flight event; trackers guard against this with generation checks.
pub struct ListenerRegistry<E> {
    listeners: Arc<Mutex<Vec<(Uuid, Listener<E>)>>>,
}

impl<E: 'static> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a listener; disposing the returned handle removes it
    pub fn subscribe(&self, listener: Listener<E>) -> Subscription {
        let id = Uuid::new_v4();
        self.listeners.lock().push((id, listener));

        let listeners = Arc::downgrade(&self.listeners);
        Subscription::with_id(id, move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    /// Deliver an event to every registered listener, in subscription order
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of live listeners
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

impl<E: 'static> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ListenerRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<E> fmt::Debug for ListenerRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn cleanup_runs_exactly_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(subscription.is_active());
        subscription.dispose();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let counter = runs.clone();
        {
            let _dropped = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn combined_subscription_disposes_every_part() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let first = registry.subscribe(Arc::new(|_| {}));
        let second = registry.subscribe(Arc::new(|_| {}));
        assert_eq!(registry.len(), 2);

        Subscription::combine([first, second]).dispose();
        assert!(registry.is_empty());
    }

    #[test]
    fn listener_can_dispose_itself_during_emit() {
        let registry: ListenerRegistry<u8> = ListenerRegistry::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let own = slot.clone();
        let counter = calls.clone();
        let subscription = registry.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(subscription) = own.lock().take() {
                subscription.dispose();
            }
        }));
        *slot.lock() = Some(subscription);

        registry.emit(&1);
        registry.emit(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn disposing_after_registry_dropped_is_harmless() {
        let registry: ListenerRegistry<u8> = ListenerRegistry::new();
        let subscription = registry.subscribe(Arc::new(|_| {}));
        drop(registry);
        subscription.dispose();
    }
}
