//! Defaults and environment variable names for dealcache.

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default freshness window for an observed key, in milliseconds (2 minutes).
pub const DEFAULT_TTL_MS: u64 = 120_000;

/// Initial capacity reserved for the entry map.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// REST BACKEND DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Base URL of the deal-pipeline REST backend.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Request timeout for the REST backend, in seconds.
pub const DEFAULT_API_TIMEOUT_SECONDS: u64 = 30;

/// Upper bound on the response body echoed back in a status error.
pub const MAX_ERROR_BODY_CHARS: usize = 512;

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Overrides [`DEFAULT_TTL_MS`].
pub const ENV_DEFAULT_TTL_MS: &str = "DEALCACHE_DEFAULT_TTL_MS";

/// Overrides [`DEFAULT_API_BASE_URL`].
pub const ENV_API_URL: &str = "DEALCACHE_API_URL";

/// Overrides [`DEFAULT_API_TIMEOUT_SECONDS`].
pub const ENV_API_TIMEOUT_SECONDS: &str = "DEALCACHE_API_TIMEOUT_SECONDS";

/// Bearer token forwarded to the REST backend.
pub const ENV_API_TOKEN: &str = "DEALCACHE_API_TOKEN";
