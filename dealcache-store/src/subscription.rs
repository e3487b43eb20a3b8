//! Observer plumbing: per-key event listeners and unsubscribe guards.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use dealcache_core::types::CacheEvent;

/// Callback receiving cache-level events for one key.
pub type EventCallback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Handle returned by every `subscribe` call.
///
/// Dropping it unsubscribes. [`Subscription::detach`] keeps the callback
/// registered for the lifetime of its source.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Removes the callback now.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }

    /// Leaves the callback registered and forgets the handle.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Listeners grouped by key.
#[derive(Default)]
pub(crate) struct KeyListeners {
    by_key: DashMap<String, Vec<(u64, EventCallback)>>,
    next_id: AtomicU64,
}

impl KeyListeners {
    pub(crate) fn add(&self, key: &str, callback: EventCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.by_key
            .entry(key.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    pub(crate) fn remove(&self, key: &str, id: u64) {
        if let Some(mut listeners) = self.by_key.get_mut(key) {
            listeners.retain(|(listener_id, _)| *listener_id != id);
        }
        self.by_key.remove_if(key, |_, listeners| listeners.is_empty());
    }

    /// Delivers `event` to the key's listeners.
    ///
    /// Callbacks run after the map shard guard is released, so they may
    /// subscribe, unsubscribe or emit.
    pub(crate) fn emit(&self, event: &CacheEvent) {
        let callbacks: Vec<EventCallback> = match self.by_key.get(event.key()) {
            Some(listeners) => listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(event);
        }
    }

    pub(crate) fn count(&self, key: &str) -> usize {
        self.by_key.get(key).map(|l| l.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<CacheEvent>>>, EventCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Arc::new(move |e: &CacheEvent| sink.lock().push(e.clone())))
    }

    #[test]
    fn test_emit_reaches_only_matching_key() {
        let listeners = KeyListeners::default();
        let (seen, cb) = recorder();
        listeners.add("projects", cb);

        listeners.emit(&CacheEvent::Stored { key: "projects".into() });
        listeners.emit(&CacheEvent::Stored { key: "deals".into() });

        assert_eq!(*seen.lock(), vec![CacheEvent::Stored { key: "projects".into() }]);
    }

    #[test]
    fn test_remove_drops_empty_bucket() {
        let listeners = KeyListeners::default();
        let (_seen, cb) = recorder();
        let id = listeners.add("projects", cb);
        assert_eq!(listeners.count("projects"), 1);

        listeners.remove("projects", id);
        assert_eq!(listeners.count("projects"), 0);
        assert!(listeners.by_key.is_empty());
    }

    #[test]
    fn test_subscription_runs_unsubscribe_once() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.detach();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
