//! Cache-level change notifications.

use serde::{Deserialize, Serialize};

/// A change to the entry stored under one key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheEvent {
    /// A producer result was written under `key`.
    Stored {
        /// Affected key
        key: String,
    },
    /// `key` was explicitly invalidated; bindings on it reset to loading.
    Invalidated {
        /// Affected key
        key: String,
    },
    /// The entry was dropped by a bulk operation (pattern, clear, purge).
    Removed {
        /// Affected key
        key: String,
    },
}

impl CacheEvent {
    /// The key this event concerns.
    pub fn key(&self) -> &str {
        match self {
            CacheEvent::Stored { key }
            | CacheEvent::Invalidated { key }
            | CacheEvent::Removed { key } => key,
        }
    }
}
