//! # dealcache HTTP
//!
//! REST producer for the dealcache store.
//!
//! [`ApiClient`] performs JSON GET requests against the backend, honoring a
//! [`CancelToken`](dealcache_core::CancelToken) so a superseded fetch drops its
//! request. [`JsonProducer`] plugs one path into the cache.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dealcache_http::ApiClient;
//! use dealcache_store::{KeyedAsyncCache, ObserveOptions};
//!
//! let client = ApiClient::from_env()?;
//! let projects = client.producer::<Vec<Project>>("/api/projects");
//!
//! let cache = KeyedAsyncCache::new();
//! let binding = cache.observe(projects.cache_key(), projects, ObserveOptions::new().ttl_ms(300_000))?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod client;
mod config;
mod producer;

pub use client::ApiClient;
pub use config::ApiConfig;
pub use producer::{cache_key, JsonProducer};
