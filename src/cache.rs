//! Push-invalidated response cache
//!
//! Responses are memoized per path and subkey (query signature) only
//! while the push channel is connected: without change notifications
//! staleness cannot be detected, so every lookup goes to the server.
//! Each cached path holds exactly one push subscription whose callback
//! invalidates that path.

use crate::push::{PushChannel, SubscriptionHandle};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::debug;

/// Paths reported as changed by a mutating request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedResources {
    #[serde(default)]
    pub changed_descendants: Vec<String>,
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl UpdatedResources {
    /// Parse the `updated_resources` member of a response body, if present.
    pub fn from_body(body: &Value) -> Option<Self> {
        body.get("updated_resources")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.changed_descendants
            .iter()
            .chain(&self.created)
            .chain(&self.modified)
            .chain(&self.removed)
    }
}

struct CacheEntry {
    handle: SubscriptionHandle,
    subs: HashMap<String, Arc<OnceCell<Value>>>,
}

struct CacheInner {
    entries: DashMap<String, CacheEntry>,
    push: Arc<dyn PushChannel>,
}

impl CacheInner {
    fn invalidate(&self, path: &str) {
        if let Some((_, entry)) = self.entries.remove(path) {
            debug!(path, "cache invalidate");
            self.push.unsubscribe(path, entry.handle);
        }
    }

    fn invalidate_all(&self) {
        let paths: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for path in paths {
            self.invalidate(&path);
        }
    }
}

/// Process-wide response cache shared by every caller of the HTTP service.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    /// Create a cache bound to `push`; closing the channel invalidates everything.
    pub fn new(push: Arc<dyn PushChannel>) -> Self {
        let inner = Arc::new(CacheInner {
            entries: DashMap::new(),
            push: Arc::clone(&push),
        });
        let weak: Weak<CacheInner> = Arc::downgrade(&inner);
        push.on_close(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.invalidate_all();
            }
        }));
        Self { inner }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.push.is_connected()
    }

    /// Return the memoized value for `(path, subkey)` or compute and store it.
    ///
    /// Concurrent calls for the same key share one computation. Errors are
    /// not cached. While disconnected `compute` always runs uncached.
    pub async fn memoize<F, Fut, E>(&self, path: &str, subkey: &str, compute: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if !self.is_connected() {
            return compute().await;
        }
        let cell = self.cell(path, subkey);
        cell.get_or_try_init(compute).await.cloned()
    }

    /// Seed a value unless one is already present. No-op while disconnected.
    pub fn put_cached(&self, path: &str, subkey: &str, value: Value) {
        if !self.is_connected() {
            return;
        }
        let cell = self.cell(path, subkey);
        let _ = cell.set(value);
    }

    /// Whether a resolved value is cached for `(path, subkey)`.
    pub fn contains(&self, path: &str, subkey: &str) -> bool {
        self.inner
            .entries
            .get(path)
            .and_then(|e| e.subs.get(subkey).map(|c| c.initialized()))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop every subkey of `path` and its subscription.
    pub fn invalidate(&self, path: &str) {
        self.inner.invalidate(path);
    }

    pub fn invalidate_all(&self) {
        debug!(entries = self.len(), "cache invalidate all");
        self.inner.invalidate_all();
    }

    /// Invalidate every path named in a mutation's `updated_resources`.
    pub fn invalidate_updated(&self, updated: &UpdatedResources) {
        for path in updated.paths() {
            self.invalidate(path);
        }
    }

    fn cell(&self, path: &str, subkey: &str) -> Arc<OnceCell<Value>> {
        if let Some(mut entry) = self.inner.entries.get_mut(path) {
            return Arc::clone(entry.subs.entry(subkey.to_string()).or_default());
        }

        // Subscribe without holding a map guard: the callback re-enters the map.
        let weak = Arc::downgrade(&self.inner);
        let handle = self.inner.push.subscribe(
            path,
            Arc::new(move |changed: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidate(changed);
                }
            }),
        );

        match self.inner.entries.entry(path.to_string()) {
            Entry::Occupied(mut occupied) => {
                self.inner.push.unsubscribe(path, handle);
                Arc::clone(occupied.get_mut().subs.entry(subkey.to_string()).or_default())
            }
            Entry::Vacant(vacant) => {
                let cell = Arc::new(OnceCell::new());
                let mut subs = HashMap::new();
                subs.insert(subkey.to_string(), Arc::clone(&cell));
                vacant.insert(CacheEntry { handle, subs });
                cell
            }
        }
    }
}
