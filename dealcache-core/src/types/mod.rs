//! Domain types for dealcache.
//!
//! - [`BindingPhase`]: where a binding sits in its fetch state machine
//! - [`BindingSnapshot`]: the consumer-visible `data`/`loading`/`error` view
//! - [`CacheEvent`]: notifications emitted when a key's entry changes

mod event;
mod snapshot;

pub use event::*;
pub use snapshot::*;
