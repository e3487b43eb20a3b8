//! Cache producer backed by a REST GET.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use dealcache_core::cancel::CancelToken;
use dealcache_core::error::Result;
use dealcache_core::traits::Producer;

use crate::client::ApiClient;

/// Fetches one path and decodes it as `T`.
pub struct JsonProducer<T> {
    client: ApiClient,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonProducer<T> {
    /// Creates a producer for `path` on `client`.
    pub fn new(client: ApiClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cache key for this resource: `"GET <path>"`.
    pub fn cache_key(&self) -> String {
        cache_key(&self.path)
    }
}

/// Cache key used for a GET of `path`.
pub fn cache_key(path: &str) -> String {
    format!("GET {}", path)
}

impl<T> Clone for JsonProducer<T> {
    fn clone(&self) -> Self {
        Self::new(self.client.clone(), self.path.clone())
    }
}

impl<T> fmt::Debug for JsonProducer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonProducer")
            .field("path", &self.path)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

#[async_trait]
impl<T> Producer<T> for JsonProducer<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn produce(&self, cancel: CancelToken) -> Result<T> {
        self.client.get_json(&self.path, &cancel).await
    }
}
