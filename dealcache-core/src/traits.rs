//! Common traits for dealcache.
//!
//! A [`Producer`] is the asynchronous source behind a cache key. The cache
//! never inspects what a producer does; it only awaits the result and decides
//! whether that result may still be applied.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::{CacheError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// PRODUCER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Zero-argument asynchronous value source.
///
/// Implementations might:
/// - call a REST endpoint (see `dealcache-http`)
/// - read from a local store
/// - compute a value in-process (tests, demos)
///
/// The token is cancelled when the call is superseded by a newer one or the
/// owning binding is dropped. Returning [`CacheError::Cancelled`] in that case
/// is the polite answer; the cache discards the result regardless.
#[async_trait]
pub trait Producer<T>: Send + Sync {
    /// Produces a fresh value.
    async fn produce(&self, cancel: CancelToken) -> Result<T>;
}

/// Callback invoked when a producer call fails with a genuine error.
pub type ErrorCallback = Arc<dyn Fn(&CacheError) + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════════════
// CLOSURE ADAPTER
// ═══════════════════════════════════════════════════════════════════════════════

/// [`Producer`] backed by a closure returning a future.
///
/// Built with [`from_fn`].
pub struct FnProducer<F> {
    f: F,
}

/// Wraps a closure `Fn(CancelToken) -> impl Future<Output = Result<T>>` as a producer.
pub fn from_fn<T, F, Fut>(f: F) -> FnProducer<F>
where
    F: Fn(CancelToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
{
    FnProducer { f }
}

#[async_trait]
impl<T, F, Fut> Producer<T> for FnProducer<F>
where
    T: Send + 'static,
    F: Fn(CancelToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
{
    async fn produce(&self, cancel: CancelToken) -> Result<T> {
        (self.f)(cancel).await
    }
}

#[async_trait]
impl<T, P> Producer<T> for Arc<P>
where
    T: Send + 'static,
    P: Producer<T> + ?Sized,
{
    async fn produce(&self, cancel: CancelToken) -> Result<T> {
        (**self).produce(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fn_producer_passes_token() {
        let producer = from_fn(|cancel: CancelToken| async move {
            cancel.check()?;
            Ok::<_, CacheError>("deals")
        });

        assert_eq!(producer.produce(CancelToken::new()).await, Ok("deals"));

        let cancelled = CancelToken::new();
        cancelled.cancel();
        assert_eq!(producer.produce(cancelled).await, Err(CacheError::Cancelled));
    }

    #[tokio::test]
    async fn test_arc_dyn_producer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let producer: Arc<dyn Producer<usize>> = Arc::new(from_fn(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n) }
        }));

        assert_eq!(producer.produce(CancelToken::new()).await, Ok(1));
        assert_eq!(producer.produce(CancelToken::new()).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
