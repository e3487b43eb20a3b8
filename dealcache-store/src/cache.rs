//! Keyed async cache with lazy TTL freshness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use dealcache_core::error::{CacheError, Result};
use dealcache_core::traits::Producer;
use dealcache_core::types::CacheEvent;

use crate::binding::{Binding, ObserveOptions};
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EntryInfo};
use crate::stats::{CacheStats, Counters};
use crate::subscription::{EventCallback, KeyListeners, Subscription};

struct Inner {
    entries: RwLock<HashMap<String, CacheEntry>>,
    listeners: KeyListeners,
    counters: Counters,
    next_binding_id: AtomicU64,
    config: CacheConfig,
}

/// Memoizes the results of asynchronous producers under string keys.
///
/// Entries are written when a producer resolves and stay in the map until
/// they are explicitly removed. Freshness (`age < ttl`) is evaluated on every
/// read; nothing is evicted on a timer.
///
/// `KeyedAsyncCache` is a cheap handle: clones share the same entries. Create
/// one per application (or per test) and pass it to whoever needs it.
#[derive(Clone)]
pub struct KeyedAsyncCache {
    inner: Arc<Inner>,
}

impl KeyedAsyncCache {
    /// Creates a cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a cache with custom configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::with_capacity(config.initial_capacity)),
                listeners: KeyListeners::default(),
                counters: Counters::default(),
                next_binding_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Returns the configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OBSERVATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Starts observing `key` through `producer`.
    ///
    /// A fresh entry is served immediately without calling the producer.
    /// Otherwise the binding switches to loading and the producer runs on the
    /// current tokio runtime. With `options.enabled == false` nothing happens
    /// and the binding stays idle.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidUsage`] if `key` is empty or whitespace, or if
    /// called outside a tokio runtime.
    pub fn observe<T, P>(
        &self,
        key: impl Into<String>,
        producer: P,
        options: ObserveOptions,
    ) -> Result<Binding<T>>
    where
        T: Send + Sync + 'static,
        P: Producer<T> + 'static,
    {
        let key = key.into();
        validate_key(&key)?;
        tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::InvalidUsage("observe must be called within a tokio runtime".into())
        })?;
        Ok(Binding::start(self.clone(), key, Arc::new(producer), options))
    }

    /// Subscribes to entry changes under `key`.
    pub fn subscribe(
        &self,
        key: impl Into<String>,
        callback: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_arc(key.into(), Arc::new(callback))
    }

    pub(crate) fn subscribe_arc(&self, key: String, callback: EventCallback) -> Subscription {
        let id = self.inner.listeners.add(&key, callback);
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.remove(&key, id);
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DIRECT ACCESS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns the value under `key` if it is fresh and of type `T`.
    ///
    /// Does not count towards hit/miss statistics.
    pub fn peek<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.inner.entries.read();
        let entry = entries.get(key).filter(|e| e.is_fresh())?;
        Arc::clone(&entry.value).downcast::<T>().ok()
    }

    /// Writes a value as if a producer had just resolved it.
    ///
    /// Useful for hydrating the cache from data obtained elsewhere.
    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        self.write(&key, Arc::new(value), ttl);
        self.emit(CacheEvent::Stored { key });
    }

    /// Fresh-entry lookup used by bindings; counts hits and misses.
    pub(crate) fn lookup<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.inner.entries.read();
        let Some(entry) = entries.get(key).filter(|e| e.is_fresh()) else {
            self.inner.counters.miss();
            return None;
        };

        match Arc::clone(&entry.value).downcast::<T>() {
            Ok(value) => {
                self.inner.counters.hit();
                debug!(key, age_ms = entry.age().as_millis() as u64, "Using cached data");
                Some(value)
            }
            Err(_) => {
                self.inner.counters.miss();
                warn!(
                    key,
                    stored = entry.type_name,
                    requested = std::any::type_name::<T>(),
                    "Cached value has a different type, treating as miss"
                );
                None
            }
        }
    }

    /// Writes an entry without notifying listeners.
    pub(crate) fn write<T: Send + Sync + 'static>(&self, key: &str, value: Arc<T>, ttl: Duration) {
        self.inner
            .entries
            .write()
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        debug!(key, ttl_ms = ttl.as_millis() as u64, "Cached data");
    }

    pub(crate) fn emit(&self, event: CacheEvent) {
        self.inner.listeners.emit(&event);
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.inner.counters
    }

    pub(crate) fn next_binding_id(&self) -> u64 {
        self.inner.next_binding_id.fetch_add(1, Ordering::Relaxed)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INVALIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Drops `key` and resets every live binding on it to loading with no data.
    ///
    /// Never fetches; the next observation, `revalidate` or `refetch` does.
    /// Returns whether an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let existed = self.inner.entries.write().remove(key).is_some();
        info!(key, existed, "Invalidating cache");
        self.emit(CacheEvent::Invalidated { key: key.to_string() });
        existed
    }

    /// Removes every entry whose key contains `pattern`.
    ///
    /// An empty pattern matches every key. Bindings keep their current data.
    /// Returns the number of entries removed.
    pub fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let removed: Vec<String> = {
            let mut entries = self.inner.entries.write();
            let matching: Vec<String> = entries
                .keys()
                .filter(|k| k.contains(pattern))
                .cloned()
                .collect();
            for key in &matching {
                entries.remove(key);
            }
            matching
        };

        info!(pattern, removed = removed.len(), "Invalidated cache by pattern");
        let count = removed.len();
        for key in removed {
            self.emit(CacheEvent::Removed { key });
        }
        count
    }

    /// Empties the cache. Safe to call on an empty cache.
    pub fn clear_all(&self) {
        let removed: Vec<String> = self.inner.entries.write().drain().map(|(k, _)| k).collect();
        info!(removed = removed.len(), "All cache cleared");
        for key in removed {
            self.emit(CacheEvent::Removed { key });
        }
    }

    /// Removes entries that are no longer fresh. Returns how many were dropped.
    ///
    /// Staleness alone never removes anything; this is the explicit way to
    /// reclaim memory held by expired entries.
    pub fn purge_stale(&self) -> usize {
        let removed: Vec<String> = {
            let mut entries = self.inner.entries.write();
            let stale: Vec<String> = entries
                .iter()
                .filter(|(_, e)| !e.is_fresh())
                .map(|(k, _)| k.clone())
                .collect();
            for key in &stale {
                entries.remove(key);
            }
            stale
        };

        debug!(removed = removed.len(), "Purged stale entries");
        let count = removed.len();
        for key in removed {
            self.emit(CacheEvent::Removed { key });
        }
        count
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INSPECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns true if any entry (fresh or stale) exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    /// Returns true if a fresh entry exists under `key`.
    pub fn is_fresh(&self, key: &str) -> bool {
        self.inner
            .entries
            .read()
            .get(key)
            .map(|e| e.is_fresh())
            .unwrap_or(false)
    }

    /// Returns the number of entries, including stale ones.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Returns all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns per-entry details, sorted by key.
    pub fn entries(&self) -> Vec<EntryInfo> {
        let mut infos: Vec<EntryInfo> = self
            .inner
            .entries
            .read()
            .iter()
            .map(|(k, e)| e.info(k))
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Number of listeners registered on `key` (bindings included).
    pub fn listener_count(&self, key: &str) -> usize {
        self.inner.listeners.count(key)
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = {
            let entries = self.inner.entries.read();
            let fresh = entries.values().filter(|e| e.is_fresh()).count();
            CacheStats {
                total_entries: entries.len(),
                fresh_entries: fresh,
                stale_entries: entries.len() - fresh,
                ..Default::default()
            }
        };
        self.inner.counters.fill(&mut stats);
        stats
    }
}

impl Default for KeyedAsyncCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyedAsyncCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedAsyncCache")
            .field("entries", &self.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CacheError::InvalidUsage("cache key cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_insert_peek() {
        let cache = KeyedAsyncCache::new();
        cache.insert("projects", vec![1u32, 2], MINUTE);

        let value = cache.peek::<Vec<u32>>("projects").unwrap();
        assert_eq!(*value, vec![1, 2]);
        assert!(cache.contains("projects"));
        assert!(cache.is_fresh("projects"));
    }

    #[test]
    fn test_peek_wrong_type_is_none() {
        let cache = KeyedAsyncCache::new();
        cache.insert("projects", 7u64, MINUTE);
        assert!(cache.peek::<String>("projects").is_none());
    }

    #[test]
    fn test_write_replaces() {
        let cache = KeyedAsyncCache::new();
        cache.insert("projects", 1u8, MINUTE);
        cache.insert("projects", 2u8, MINUTE);

        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.peek::<u8>("projects").unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries_stay_until_removed() {
        let cache = KeyedAsyncCache::new();
        cache.insert("projects", 1u8, Duration::from_millis(10));

        tokio::time::advance(Duration::from_millis(10)).await;

        assert!(cache.peek::<u8>("projects").is_none());
        assert!(cache.contains("projects"));
        assert_eq!(cache.stats().stale_entries, 1);

        assert_eq!(cache.purge_stale(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_counts() {
        let cache = KeyedAsyncCache::new();
        assert!(cache.lookup::<u8>("projects").is_none());

        cache.insert("projects", 1u8, MINUTE);
        assert!(cache.lookup::<u8>("projects").is_some());
        // Type mismatch is a miss
        assert!(cache.lookup::<u16>("projects").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_invalidate() {
        let cache = KeyedAsyncCache::new();
        cache.insert("projects", 1u8, MINUTE);

        assert!(cache.invalidate("projects"));
        assert!(!cache.contains("projects"));
        assert!(!cache.invalidate("projects"));
    }

    #[test]
    fn test_invalidate_by_pattern() {
        let cache = KeyedAsyncCache::new();
        cache.insert("proj-42:deals", 1u8, MINUTE);
        cache.insert("proj-42:risks", 2u8, MINUTE);
        cache.insert("proj-7:deals", 3u8, MINUTE);
        cache.insert("watchlist", 4u8, MINUTE);

        assert_eq!(cache.invalidate_by_pattern("proj-42"), 2);
        assert_eq!(cache.keys(), vec!["proj-7:deals", "watchlist"]);
    }

    #[test]
    fn test_clear_all_idempotent() {
        let cache = KeyedAsyncCache::new();
        cache.clear_all();
        assert!(cache.is_empty());

        cache.insert("a", 1u8, MINUTE);
        cache.insert("b", 2u8, MINUTE);
        cache.clear_all();
        cache.clear_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_subscribe_events() {
        let cache = KeyedAsyncCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = cache.subscribe("proj-42:deals", move |e| sink.lock().push(e.clone()));

        cache.insert("proj-42:deals", 1u8, MINUTE);
        cache.insert("other", 1u8, MINUTE);
        cache.invalidate_by_pattern("proj-42");
        cache.invalidate("proj-42:deals");

        assert_eq!(
            *seen.lock(),
            vec![
                CacheEvent::Stored { key: "proj-42:deals".into() },
                CacheEvent::Removed { key: "proj-42:deals".into() },
                CacheEvent::Invalidated { key: "proj-42:deals".into() },
            ]
        );

        drop(sub);
        assert_eq!(cache.listener_count("proj-42:deals"), 0);
        cache.insert("proj-42:deals", 1u8, MINUTE);
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_callback_may_reenter_cache() {
        let cache = KeyedAsyncCache::new();
        let handle = cache.clone();
        let _sub = cache.subscribe("source", move |_| {
            handle.insert("mirror", 1u8, MINUTE);
        });

        cache.insert("source", 0u8, MINUTE);
        assert!(cache.contains("mirror"));
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = KeyedAsyncCache::new();
        let other = cache.clone();
        cache.insert("k", 1u8, MINUTE);
        assert!(other.contains("k"));

        // Separate instances are isolated
        assert!(KeyedAsyncCache::new().is_empty());
    }

    proptest! {
        #[test]
        fn prop_pattern_removes_exactly_matching_keys(
            keys in proptest::collection::hash_set("[a-z0-9:-]{1,12}", 0..24),
            pattern in "[a-z0-9-]{1,4}",
        ) {
            let cache = KeyedAsyncCache::new();
            for key in &keys {
                cache.insert(key.clone(), (), MINUTE);
            }

            let expected_removed = keys.iter().filter(|k| k.contains(&pattern)).count();
            prop_assert_eq!(cache.invalidate_by_pattern(&pattern), expected_removed);

            for key in &keys {
                prop_assert_eq!(cache.contains(key), !key.contains(&pattern));
            }
        }
    }
}
