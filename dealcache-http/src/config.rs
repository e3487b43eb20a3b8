//! REST backend configuration.

use serde::{Deserialize, Serialize};

use dealcache_core::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_API_TIMEOUT_SECONDS, ENV_API_TIMEOUT_SECONDS, ENV_API_TOKEN,
    ENV_API_URL,
};
use dealcache_core::error::{CacheError, Result};

/// Backend connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL that request paths are appended to
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Sent as `Authorization: Bearer <token>` when set
    pub bearer_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            timeout_seconds: DEFAULT_API_TIMEOUT_SECONDS,
            bearer_token: None,
        }
    }
}

impl ApiConfig {
    /// Creates config for a base URL with default timeout and no token.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get(ENV_API_URL) {
            config.base_url = url.trim().to_string();
        }
        if let Some(raw) = get(ENV_API_TIMEOUT_SECONDS) {
            config.timeout_seconds = raw.trim().parse().map_err(|_| {
                CacheError::Config(format!(
                    "{ENV_API_TIMEOUT_SECONDS} must be a whole number of seconds, got '{raw}'"
                ))
            })?;
        }
        config.bearer_token = get(ENV_API_TOKEN);

        Ok(config)
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
