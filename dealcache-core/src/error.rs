//! Error types for dealcache.
//!
//! Producers report failures through [`CacheError`]. The cache converts every
//! error into binding state except [`CacheError::Cancelled`], which is dropped
//! silently.

use thiserror::Error;

/// Result type alias using `CacheError`.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Main error type for all dealcache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    // ═══════════════════════════════════════════════════════════════════════════
    // USAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The caller broke an API contract (empty key, etc.).
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // PRODUCER ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The request was superseded or its binding was dropped.
    #[error("Request cancelled")]
    Cancelled,

    /// Generic producer failure.
    #[error("{0}")]
    Producer(String),

    /// The producer panicked while computing a value.
    #[error("Producer panicked: {0}")]
    ProducerPanicked(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // REST ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transport-level HTTP failure.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The backend answered with a non-success status.
    #[error("Request failed with status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// The payload could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request did not complete in time.
    #[error("Request timed out after {seconds}s")]
    Timeout {
        /// Configured timeout
        seconds: u64,
    },
}

impl CacheError {
    /// Shorthand for a [`CacheError::Producer`] with the given message.
    pub fn producer(message: impl Into<String>) -> Self {
        CacheError::Producer(message.into())
    }

    /// Returns true if this is the cancellation signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }

    /// Returns true if a retry may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CacheError::Http(_) | CacheError::Timeout { .. } => true,
            CacheError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_error_display() {
        let err = CacheError::Status {
            status: 503,
            body: "maintenance".into(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("maintenance"));

        // Producer messages are surfaced verbatim
        assert_eq!(CacheError::producer("boom").to_string(), "boom");
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(CacheError::Cancelled.is_cancellation());
        assert!(!CacheError::producer("x").is_cancellation());
        assert!(!CacheError::Cancelled.is_recoverable());
    }

    #[test_case(CacheError::Http("reset".into()), true ; "transport")]
    #[test_case(CacheError::Timeout { seconds: 30 }, true ; "timeout")]
    #[test_case(CacheError::Status { status: 502, body: String::new() }, true ; "bad gateway")]
    #[test_case(CacheError::Status { status: 429, body: String::new() }, true ; "rate limited")]
    #[test_case(CacheError::Status { status: 404, body: String::new() }, false ; "not found")]
    #[test_case(CacheError::Decode("eof".into()), false ; "decode")]
    #[test_case(CacheError::InvalidUsage("empty key".into()), false ; "usage")]
    fn test_recoverable(err: CacheError, expected: bool) {
        assert_eq!(err.is_recoverable(), expected);
    }
}
