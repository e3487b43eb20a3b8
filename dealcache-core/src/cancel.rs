//! Cooperative cancellation for producer invocations.
//!
//! A [`CancelToken`] is created by the cache for every producer call and
//! handed to the producer. Cancelling it does not stop the producer by force;
//! producers that perform I/O should race their work against
//! [`CancelToken::cancelled`]. The cache ignores the result of a cancelled
//! call either way.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{CacheError, Result};

/// Shared cancellation flag backed by a `watch` channel.
///
/// Clones observe the same flag. Once cancelled, a token stays cancelled.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns `Err(CacheError::Cancelled)` if the token was cancelled.
    ///
    /// Convenient between steps of a multi-stage producer.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CacheError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` can only fail if it
        // is dropped, which cannot happen while we hold it.
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_starts_live() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();

        clone.cancel();

        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(CacheError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::task::yield_now().await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("already-cancelled token should resolve");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_pends_while_live() {
        let token = CancelToken::new();
        let outcome = tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await;
        assert!(outcome.is_err());
    }
}
