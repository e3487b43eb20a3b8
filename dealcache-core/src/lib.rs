//! # dealcache Core
//!
//! Core types, errors, and traits shared by every dealcache crate.
//!
//! This crate provides the building blocks the cache and its producers agree on:
//!
//! - **Errors**: [`CacheError`] taxonomy, including the cancellation signal
//! - **Cancellation**: [`CancelToken`], the owned handle passed to each producer call
//! - **Traits**: [`Producer`], the asynchronous value source behind a cache key
//! - **Types**: binding snapshots, phases, and cache events
//! - **Constants**: defaults and environment variable names
//!
//! ## Example
//!
//! ```rust
//! use dealcache_core::{from_fn, CancelToken, Producer};
//!
//! # tokio_test::block_on(async {
//! let producer = from_fn(|_cancel: CancelToken| async { Ok(vec![1u32, 2, 3]) });
//! let value = producer.produce(CancelToken::new()).await.unwrap();
//! assert_eq!(value, vec![1, 2, 3]);
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod cancel;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use cancel::CancelToken;
pub use constants::*;
pub use error::{CacheError, Result};
pub use traits::*;
pub use types::*;
