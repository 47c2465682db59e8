//! Push notification primitive
//!
//! The backend announces resource changes over a WebSocket. The HTTP
//! layer only needs a pub/sub view of it: subscribe to a path, get a
//! callback when it changes, and learn when the connection goes away.
//! `PushHub` is an in-memory implementation that a socket reader drives
//! through `connect`, `handle_message` and `close`.

use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback invoked with the changed path.
pub type PushCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked when the push transport closes.
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Subscription-based change notifications.
pub trait PushChannel: Send + Sync {
    /// Whether change notifications are currently being delivered.
    fn is_connected(&self) -> bool;

    /// Register `on_event` for changes of `path`.
    fn subscribe(&self, path: &str, on_event: PushCallback) -> SubscriptionHandle;

    /// Drop a subscription; unknown handles are ignored.
    fn unsubscribe(&self, path: &str, handle: SubscriptionHandle);

    /// Register a listener for the transport closing.
    fn on_close(&self, callback: CloseCallback);
}

/// Change notification as sent by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    pub event: String,
    pub resource: String,
}

/// In-memory push channel.
pub struct PushHub {
    connected: AtomicBool,
    next_handle: AtomicU64,
    subscribers: DashMap<String, Vec<(SubscriptionHandle, PushCallback)>>,
    close_listeners: DashMap<u64, CloseCallback>,
}

impl PushHub {
    /// A disconnected hub. Caches stay bypassed until `connect` is called.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            subscribers: DashMap::new(),
            close_listeners: DashMap::new(),
        }
    }

    pub fn connected() -> Self {
        let hub = Self::new();
        hub.connect();
        hub
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Mark the transport closed, drop all subscriptions and notify listeners.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let listeners: Vec<CloseCallback> =
            self.close_listeners.iter().map(|e| Arc::clone(e.value())).collect();
        debug!(listeners = listeners.len(), "push transport closed");
        for listener in listeners {
            listener();
        }
        self.subscribers.clear();
    }

    /// Deliver a change of `path` to its subscribers.
    pub fn notify(&self, path: &str) {
        // Callbacks may unsubscribe, so they run after the map guard is released.
        let callbacks: Vec<PushCallback> = match self.subscribers.get(path) {
            Some(subs) => subs.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };
        debug!(path, subscribers = callbacks.len(), "push notification");
        for callback in callbacks {
            callback(path);
        }
    }

    /// Handle a raw backend message `{"event": ..., "resource": ...}`.
    pub fn handle_message(&self, message: &str) {
        match serde_json::from_str::<PushEvent>(message) {
            Ok(event) => self.notify(&event.resource),
            Err(e) => warn!(error = %e, "ignoring malformed push message"),
        }
    }

    pub fn subscription_count(&self, path: &str) -> usize {
        self.subscribers.get(path).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PushChannel for PushHub {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, path: &str, on_event: PushCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .entry(path.to_string())
            .or_default()
            .push((handle, on_event));
        handle
    }

    fn unsubscribe(&self, path: &str, handle: SubscriptionHandle) {
        let now_empty = match self.subscribers.get_mut(path) {
            Some(mut subs) => {
                subs.retain(|(h, _)| *h != handle);
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.subscribers.remove_if(path, |_, subs| subs.is_empty());
        }
    }

    fn on_close(&self, callback: CloseCallback) {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.close_listeners.insert(id, callback);
    }
}
