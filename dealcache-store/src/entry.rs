//! Stored values and their freshness.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Value stored under a key.
///
/// The payload is type-erased; the type per key is a caller convention.
#[derive(Clone)]
pub(crate) struct CacheEntry {
    pub(crate) value: Arc<dyn Any + Send + Sync>,
    pub(crate) type_name: &'static str,
    pub(crate) stored_at: Instant,
    pub(crate) written_at: DateTime<Utc>,
    pub(crate) ttl: Duration,
}

impl CacheEntry {
    pub(crate) fn new<T: Send + Sync + 'static>(value: Arc<T>, ttl: Duration) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
            stored_at: Instant::now(),
            written_at: Utc::now(),
            ttl,
        }
    }

    pub(crate) fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Fresh while `age < ttl`; a zero TTL is never fresh.
    pub(crate) fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }

    pub(crate) fn info(&self, key: &str) -> EntryInfo {
        EntryInfo {
            key: key.to_string(),
            type_name: self.type_name,
            age: self.age(),
            ttl: self.ttl,
            fresh: self.is_fresh(),
            written_at: self.written_at,
        }
    }
}

/// Inspection view of one entry.
#[derive(Clone, Debug, Serialize)]
pub struct EntryInfo {
    /// Cache key
    pub key: String,
    /// Rust type of the stored value
    pub type_name: &'static str,
    /// Time since the entry was written
    pub age: Duration,
    /// TTL recorded by the writer
    pub ttl: Duration,
    /// Whether the entry would be served without fetching
    pub fresh: bool,
    /// Wall-clock write time
    pub written_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_freshness_window() {
        let entry = CacheEntry::new(Arc::new(1u8), Duration::from_millis(100));
        assert!(entry.is_fresh());

        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(entry.is_fresh());

        // Boundary is exclusive: age == ttl is stale
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!entry.is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_fresh() {
        let entry = CacheEntry::new(Arc::new("x"), Duration::ZERO);
        assert!(!entry.is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_info() {
        let entry = CacheEntry::new(Arc::new(vec![1u32]), Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(250)).await;

        let info = entry.info("deals");
        assert_eq!(info.key, "deals");
        assert_eq!(info.age, Duration::from_millis(250));
        assert!(info.fresh);
        assert!(info.type_name.contains("Vec<u32>"));

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["key"], "deals");
        assert_eq!(json["fresh"], true);
        assert_eq!(json["ttl"]["secs"], 1);
    }
}
