//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dealcache_core::constants::{DEFAULT_INITIAL_CAPACITY, DEFAULT_TTL_MS, ENV_DEFAULT_TTL_MS};
use dealcache_core::error::{CacheError, Result};

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when an observation does not set one, in milliseconds
    pub default_ttl_ms: u64,
    /// Capacity reserved up front for the entry map (the map is unbounded)
    pub initial_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Sets the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = ttl.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Sets the initial capacity.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Loads configuration from the process environment.
    ///
    /// Unset variables fall back to defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DEFAULT_TTL_MS) {
            config.default_ttl_ms = raw.trim().parse().map_err(|_| {
                CacheError::Config(format!("{ENV_DEFAULT_TTL_MS} must be an integer, got '{raw}'"))
            })?;
        }

        Ok(config)
    }
}
