//! # dealcache Store
//!
//! Keyed, TTL-based memoization of asynchronous producers.
//!
//! - **Cache**: [`KeyedAsyncCache`], a shared handle over type-erased entries
//! - **Bindings**: [`Binding`], one consumer's `data`/`loading`/`error` view of a key
//! - **Invalidation**: by key, by substring pattern, or everything at once
//! - **Events**: per-key [`Subscription`]s for stored, invalidated and removed entries
//!
//! ## Example
//!
//! ```rust
//! use dealcache_store::{from_fn, CancelToken, KeyedAsyncCache, ObserveOptions};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let cache = KeyedAsyncCache::new();
//! let producer = from_fn(|_cancel: CancelToken| async { Ok(vec!["proj-1".to_string()]) });
//!
//! let projects = cache
//!     .observe("projects", producer, ObserveOptions::new().ttl_ms(300_000))
//!     .unwrap();
//! let snapshot = projects.wait_settled().await;
//! assert_eq!(snapshot.data().unwrap().len(), 1);
//!
//! // A second consumer within the TTL is served without calling a producer
//! assert!(cache.is_fresh("projects"));
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod binding;
mod cache;
mod config;
mod entry;
mod stats;
mod subscription;

pub use binding::{Binding, ObserveOptions, SnapshotCallback};
pub use cache::KeyedAsyncCache;
pub use config::CacheConfig;
pub use entry::EntryInfo;
pub use stats::CacheStats;
pub use subscription::{EventCallback, Subscription};

// Re-export what callers need from core
pub use dealcache_core::{
    from_fn, BindingPhase, BindingSnapshot, CacheError, CacheEvent, CancelToken, FnProducer,
    Producer, Result,
};
