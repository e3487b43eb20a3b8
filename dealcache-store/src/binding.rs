//! Per-consumer view of a cache key.
//!
//! A [`Binding`] drives one consumer's `data`/`loading`/`error` state. It owns
//! the cancellation token of its in-flight producer call and a generation
//! counter; only the call started last may write to the binding or the cache.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use dealcache_core::cancel::CancelToken;
use dealcache_core::error::{CacheError, Result};
use dealcache_core::traits::{ErrorCallback, Producer};
use dealcache_core::types::{BindingPhase, BindingSnapshot, CacheEvent};

use crate::cache::{validate_key, KeyedAsyncCache};
use crate::subscription::Subscription;

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Options accepted by [`KeyedAsyncCache::observe`].
#[derive(Clone)]
pub struct ObserveOptions {
    /// Freshness window for values this binding writes; `None` uses the
    /// cache's default TTL
    pub ttl: Option<Duration>,
    /// When false, observing is a no-op
    pub enabled: bool,
    /// Invoked for every genuine producer failure (never for cancellation)
    pub on_error: Option<ErrorCallback>,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            enabled: true,
            on_error: None,
        }
    }
}

impl ObserveOptions {
    /// Default options: cache TTL, enabled, no error callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the TTL in milliseconds.
    pub fn ttl_ms(self, millis: u64) -> Self {
        self.ttl(Duration::from_millis(millis))
    }

    /// Enables or disables the binding.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the error callback.
    pub fn on_error(mut self, callback: impl Fn(&CacheError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ObserveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveOptions")
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Callback receiving binding snapshots.
pub type SnapshotCallback<T> = Arc<dyn Fn(&BindingSnapshot<T>) + Send + Sync>;

struct Settings<T> {
    key: String,
    producer: Arc<dyn Producer<T>>,
    ttl: Duration,
    enabled: bool,
    on_error: Option<ErrorCallback>,
}

impl<T> Clone for Settings<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            producer: Arc::clone(&self.producer),
            ttl: self.ttl,
            enabled: self.enabled,
            on_error: self.on_error.clone(),
        }
    }
}

/// In-flight bookkeeping. `generation` increases with every fetch started or
/// superseded; a result is applied only if its generation is still current.
#[derive(Default)]
struct Flight {
    generation: u64,
    token: Option<CancelToken>,
}

impl Flight {
    /// Cancels the outstanding call, if any. Returns whether one was cancelled.
    fn supersede(&mut self) -> bool {
        self.generation += 1;
        match self.token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

enum Outcome {
    Applied,
    Failed(CacheError),
    Silent,
}

struct Shared<T> {
    id: u64,
    cache: KeyedAsyncCache,
    settings: Mutex<Settings<T>>,
    flight: Mutex<Flight>,
    state: watch::Sender<BindingSnapshot<T>>,
    subscribers: Mutex<Vec<(u64, SnapshotCallback<T>)>>,
    next_subscriber_id: AtomicU64,
    cache_listener: Mutex<Option<Subscription>>,
}

impl<T: Send + Sync + 'static> Shared<T> {
    /// Listens for invalidation of the current key.
    fn attach(self: &Arc<Self>, key: &str) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = self.cache.subscribe_arc(
            key.to_string(),
            Arc::new(move |event: &CacheEvent| {
                if let (CacheEvent::Invalidated { key }, Some(shared)) = (event, weak.upgrade()) {
                    shared.mark_invalidated(key);
                }
            }),
        );
        // Replacing drops the previous listener
        *self.cache_listener.lock() = Some(subscription);
    }

    fn mark_invalidated(&self, key: &str) {
        {
            let _flight = self.flight.lock();
            if self.state.borrow().key != key {
                return;
            }
            self.state.send_modify(|s| {
                s.data = None;
                s.loading = true;
                s.phase = BindingPhase::Invalidated;
            });
        }
        debug!(binding = self.id, key, "Binding reset by invalidation");
        self.notify();
    }

    /// Runs one observation cycle.
    ///
    /// Serves a fresh entry synchronously, or marks the binding loading and
    /// spawns the producer. Returns the fetch task when one was started.
    ///
    /// Settings are read under the flight lock so the key written to the
    /// state always matches the key being fetched.
    fn start(self: &Arc<Self>, force: bool) -> Option<JoinHandle<()>> {
        let mut flight = self.flight.lock();
        let settings = self.settings.lock().clone();
        if !settings.enabled {
            debug!(binding = self.id, key = %settings.key, "Binding disabled, skipping");
            return None;
        }

        if !force {
            if let Some(value) = self.cache.lookup::<T>(&settings.key) {
                // A cache hit starts nothing, so an outstanding fetch keeps running
                if flight.token.is_some() {
                    debug!(binding = self.id, key = %settings.key, "Fetch in flight, leaving it to settle");
                    return None;
                }
                self.state.send_modify(|s| {
                    s.key = settings.key.clone();
                    s.data = Some(value);
                    s.loading = false;
                    s.error = None;
                    s.phase = BindingPhase::Fresh;
                });
                drop(flight);
                self.notify();
                return None;
            }
        }

        let token = CancelToken::new();
        if flight.supersede() {
            debug!(binding = self.id, key = %settings.key, "Cancelling previous request");
            self.cache.counters().cancellation();
        }
        flight.token = Some(token.clone());
        self.state.send_modify(|s| {
            s.key = settings.key.clone();
            s.loading = true;
            s.error = None;
            s.phase = BindingPhase::Loading;
        });
        let generation = flight.generation;
        drop(flight);
        self.notify();

        self.cache.counters().fetch();
        debug!(binding = self.id, key = %settings.key, generation, force, "Fetching");

        let shared = Arc::clone(self);
        Some(tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(CacheError::Cancelled),
                result = AssertUnwindSafe(settings.producer.produce(token.clone())).catch_unwind() => {
                    result.unwrap_or_else(|panic| Err(CacheError::ProducerPanicked(panic_message(panic.as_ref()))))
                }
            };
            shared.settle(generation, &token, &settings, outcome);
        }))
    }

    /// Applies a producer result if it still belongs to the current generation.
    fn settle(&self, generation: u64, token: &CancelToken, settings: &Settings<T>, result: Result<T>) {
        let outcome = {
            let mut flight = self.flight.lock();
            if flight.generation != generation || token.is_cancelled() {
                debug!(binding = self.id, key = %settings.key, generation, "Discarding superseded result");
                return;
            }
            flight.token = None;

            match result {
                Ok(value) => {
                    let value = Arc::new(value);
                    self.cache.write(&settings.key, Arc::clone(&value), settings.ttl);
                    self.state.send_modify(|s| {
                        s.data = Some(Arc::clone(&value));
                        s.loading = false;
                        s.error = None;
                        s.phase = BindingPhase::Fresh;
                    });
                    Outcome::Applied
                }
                Err(CacheError::Cancelled) => {
                    // The producer gave up on its own; nothing newer is pending.
                    self.state.send_modify(|s| {
                        s.loading = false;
                        s.phase = if s.data.is_some() {
                            BindingPhase::Fresh
                        } else {
                            BindingPhase::Idle
                        };
                    });
                    Outcome::Silent
                }
                Err(err) => {
                    self.state.send_modify(|s| {
                        s.loading = false;
                        s.error = Some(err.to_string());
                        s.phase = BindingPhase::Errored;
                    });
                    Outcome::Failed(err)
                }
            }
        };

        match outcome {
            Outcome::Applied => {
                self.cache.counters().success();
                self.cache.emit(CacheEvent::Stored {
                    key: settings.key.clone(),
                });
            }
            Outcome::Failed(ref err) => {
                self.cache.counters().failure();
                warn!(binding = self.id, key = %settings.key, error = %err, "Producer failed");
            }
            Outcome::Silent => {
                self.cache.counters().cancellation();
                debug!(binding = self.id, key = %settings.key, "Producer reported cancellation");
            }
        }

        self.notify();

        if let (Outcome::Failed(err), Some(on_error)) = (&outcome, &settings.on_error) {
            on_error(err);
        }
    }

    /// Pushes the current snapshot to callback subscribers, outside all locks.
    fn notify(&self) {
        let callbacks: Vec<SnapshotCallback<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        if callbacks.is_empty() {
            return;
        }
        let snapshot = self.state.borrow().clone();
        for callback in callbacks {
            callback(&snapshot);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Live consumer view of one cache key.
///
/// Dropping the binding cancels its in-flight request and detaches it from
/// the cache; a late result is discarded.
pub struct Binding<T: Send + Sync + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + Sync + 'static> Binding<T> {
    pub(crate) fn start(
        cache: KeyedAsyncCache,
        key: String,
        producer: Arc<dyn Producer<T>>,
        options: ObserveOptions,
    ) -> Self {
        let ttl = options.ttl.unwrap_or_else(|| cache.config().default_ttl());
        let (state, _rx) = watch::channel(BindingSnapshot::idle(key.clone()));

        let shared = Arc::new(Shared {
            id: cache.next_binding_id(),
            cache,
            settings: Mutex::new(Settings {
                key: key.clone(),
                producer,
                ttl,
                enabled: options.enabled,
                on_error: options.on_error,
            }),
            flight: Mutex::new(Flight::default()),
            state,
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
            cache_listener: Mutex::new(None),
        });

        shared.attach(&key);
        shared.start(false);
        Self { shared }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current snapshot.
    pub fn snapshot(&self) -> BindingSnapshot<T> {
        self.shared.state.borrow().clone()
    }

    /// Last known value.
    pub fn data(&self) -> Option<Arc<T>> {
        self.shared.state.borrow().data.clone()
    }

    /// True while a fetch is outstanding or after invalidation.
    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    /// Message of the last genuine failure.
    pub fn error(&self) -> Option<String> {
        self.shared.state.borrow().error.clone()
    }

    /// State machine position.
    pub fn phase(&self) -> BindingPhase {
        self.shared.state.borrow().phase
    }

    /// Key currently observed.
    pub fn key(&self) -> String {
        self.shared.settings.lock().key.clone()
    }

    /// Waits until no fetch is outstanding and returns the snapshot.
    ///
    /// After [`invalidate`](Self::invalidate) the binding stays loading until
    /// something fetches, so this only returns once a fetch settles.
    pub async fn wait_settled(&self) -> BindingSnapshot<T> {
        let mut rx = self.shared.state.subscribe();
        // The sender is owned by `self.shared`, so the channel cannot close here.
        let snapshot = match rx.wait_for(|s| !s.loading).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONTROL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Re-runs the observation cycle: serve a fresh entry or start a fetch.
    ///
    /// Returns true if a fetch was started.
    pub fn revalidate(&self) -> bool {
        self.shared.start(false).is_some()
    }

    /// Fetches regardless of freshness and waits for the result.
    ///
    /// The current `data` stays visible while loading. Failures land in
    /// [`error`](Self::error); if this call is superseded, it returns once the
    /// superseded task is discarded.
    #[instrument(skip(self), fields(binding = self.shared.id, key = %self.key()))]
    pub async fn refetch(&self) {
        debug!("Manually refetching");
        if let Some(task) = self.shared.start(true) {
            if let Err(join_err) = task.await {
                error!(error = %join_err, "Fetch task did not complete");
            }
        }
    }

    /// Drops this binding's key from the cache and resets every binding on it
    /// to loading with no data. Does not fetch.
    pub fn invalidate(&self) {
        let key = self.key();
        self.shared.cache.invalidate(&key);
    }

    /// Removes cache entries whose key contains `pattern`.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        self.shared.cache.invalidate_by_pattern(pattern)
    }

    /// Switches to another key and re-runs the observation cycle.
    pub fn set_key(&self, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;
        {
            let mut flight = self.shared.flight.lock();
            {
                let mut settings = self.shared.settings.lock();
                if settings.key == key {
                    return Ok(());
                }
                settings.key = key.clone();
            }
            if flight.supersede() {
                self.shared.cache.counters().cancellation();
            }
            self.shared.state.send_modify(|s| *s = BindingSnapshot::idle(key.clone()));
        }
        self.shared.attach(&key);
        self.shared.notify();
        self.shared.start(false);
        Ok(())
    }

    /// Replaces the producer and re-runs the observation cycle.
    ///
    /// A fresh entry is still served without calling the new producer.
    pub fn set_producer<P: Producer<T> + 'static>(&self, producer: P) {
        self.shared.settings.lock().producer = Arc::new(producer);
        self.shared.start(false);
    }

    /// Enables or disables the binding. Enabling re-runs the observation cycle.
    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut settings = self.shared.settings.lock();
            if settings.enabled == enabled {
                return;
            }
            settings.enabled = enabled;
        }
        if enabled {
            self.shared.start(false);
        }
    }

    /// Cache this binding reads from.
    pub fn cache(&self) -> &KeyedAsyncCache {
        &self.shared.cache
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REACTIVE ADAPTERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Calls `callback` with the snapshot after every state change.
    pub fn subscribe(
        &self,
        callback: impl Fn(&BindingSnapshot<T>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.lock().push((id, Arc::new(callback)));

        let weak = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.subscribers.lock().retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<BindingSnapshot<T>> {
        self.shared.state.subscribe()
    }
}

impl<T: Send + Sync + 'static> Drop for Binding<T> {
    fn drop(&mut self) {
        let cancelled = self.shared.flight.lock().supersede();
        if cancelled {
            self.shared.cache.counters().cancellation();
            debug!(binding = self.shared.id, "Binding dropped, request cancelled");
        }
        self.shared.cache_listener.lock().take();
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.shared.id)
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}
