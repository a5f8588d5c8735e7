//! Event bus for broadcasting session state transitions.
//!
//! This module provides a small synchronous pub/sub primitive keyed by an
//! event kind. Every other component of the engine broadcasts its state
//! transitions through a bus: the session store fires status-change and
//! error events, and the reactive wrappers subscribe to them to drive their
//! derived state.
//!
//! # Dispatch semantics
//!
//! - [`EventBus::trigger`] synchronously invokes every listener registered
//!   for the event kind, in registration order, before returning. A caller
//!   of `set_status` can therefore rely on all listener side effects being
//!   visible immediately after the call.
//! - Dispatch iterates over a snapshot of the listener list. Listeners added
//!   or cancelled during a trigger do not affect the in-flight dispatch.
//! - Listeners may re-enter the bus (and the store that owns it); no locks
//!   are held while a listener runs.
//!
//! # Example
//!
//! ```
//! use tokenbroker_core::event_bus::EventBus;
//!
//! let bus: EventBus<&'static str, u32> = EventBus::new();
//! let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
//!
//! let seen_in_listener = seen.clone();
//! let subscription = bus.add_listener("tick", move |value| {
//!     seen_in_listener.lock().unwrap().push(*value);
//! });
//!
//! bus.trigger(&"tick", &1);
//! bus.trigger(&"tick", &2);
//! subscription.cancel();
//! bus.trigger(&"tick", &3);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Listener<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct Registered<P> {
    id: u64,
    listener: Listener<P>,
}

type ListenerMap<K, P> = Mutex<HashMap<K, Vec<Registered<P>>>>;

/// Synchronous pub/sub bus keyed by event kind `K` with payload `P`.
///
/// Cloning is cheap; clones share the same listener registry.
pub struct EventBus<K, P> {
    listeners: Arc<ListenerMap<K, P>>,
    next_id: Arc<AtomicU64>,
}

impl<K, P> Clone for EventBus<K, P> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K, P> Default for EventBus<K, P>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> EventBus<K, P>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a listener for one event kind.
    ///
    /// Returns a [`Subscription`] bound to exactly this listener. Dropping
    /// the subscription (or calling [`Subscription::cancel`]) removes the
    /// listener; cancelling twice is a no-op.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn add_listener<F>(&self, kind: K, listener: F) -> Subscription<K, P>
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registered = Registered {
            id,
            listener: Arc::new(listener),
        };

        // Mutex poisoning is unrecoverable here; propagating the inner data
        // keeps the bus usable for the remaining listeners.
        let mut map = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(kind.clone()).or_default().push(registered);
        drop(map);

        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            kind,
            id,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Invoke every listener currently registered for `kind` with `payload`.
    ///
    /// Listeners run synchronously, in registration order, on the calling
    /// thread. The listener list is snapshotted first, so registrations and
    /// cancellations performed by a listener take effect only for later
    /// triggers.
    pub fn trigger(&self, kind: &K, payload: &P) {
        let snapshot: Vec<Listener<P>> = {
            let map = match self.listeners.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.get(kind)
                .map(|entries| entries.iter().map(|r| Arc::clone(&r.listener)).collect())
                .unwrap_or_default()
        };

        for listener in snapshot {
            listener(payload);
        }
    }

    /// Number of listeners currently registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: &K) -> usize {
        let map = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(kind).map_or(0, Vec::len)
    }
}

/// Handle bound to a single registered listener.
///
/// The subscription removes its listener when cancelled or dropped. Holding
/// it is what keeps the listener alive; store it alongside whatever state
/// the listener updates.
pub struct Subscription<K, P> {
    listeners: Weak<ListenerMap<K, P>>,
    kind: K,
    id: u64,
    cancelled: AtomicBool,
}

impl<K, P> Subscription<K, P>
where
    K: Eq + Hash,
{
    /// Remove the listener this subscription is bound to.
    ///
    /// Safe to call multiple times; only the first call removes anything.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        let mut map = match listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entries) = map.get_mut(&self.kind) {
            entries.retain(|r| r.id != self.id);
            if entries.is_empty() {
                map.remove(&self.kind);
            }
        }
    }

    /// Whether this subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<K, P> Drop for Subscription<K, P> {
    fn drop(&mut self) {
        // Drop cannot carry cancel()'s K: Eq + Hash bound, so the listener
        // is removed by id across all kinds instead of by key lookup.
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(listeners) = self.listeners.upgrade() {
            let mut map = match listeners.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for entries in map.values_mut() {
                entries.retain(|r| r.id != self.id);
            }
            map.retain(|_, entries| !entries.is_empty());
        }
    }
}
