//! JSON-over-HTTP client with cooperative cancellation.

use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use dealcache_core::cancel::CancelToken;
use dealcache_core::constants::MAX_ERROR_BODY_CHARS;
use dealcache_core::error::{CacheError, Result};

use crate::config::ApiConfig;
use crate::producer::JsonProducer;

/// Client for the REST backend.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    config: ApiConfig,
    base: Url,
    http_client: reqwest::Client,
}

impl ApiClient {
    /// Creates a client for `config`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Config`] if the base URL does not parse or the HTTP
    /// client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let mut base = Url::parse(&config.base_url).map_err(|e| {
            CacheError::Config(format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;
        // Joining relative paths keeps the base path only with a trailing slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CacheError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            base,
            http_client,
        })
    }

    /// Creates a client from `DEALCACHE_API_*` variables (and `.env`).
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env()?)
    }

    /// Configuration in use.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Resolves `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| CacheError::InvalidUsage(format!("Invalid request path '{}': {}", path, e)))
    }

    /// Producer that GETs `path` and decodes it as `T`.
    pub fn producer<T>(&self, path: impl Into<String>) -> JsonProducer<T> {
        JsonProducer::new(self.clone(), path)
    }

    /// GETs `path` and decodes the JSON body.
    ///
    /// Returns [`CacheError::Cancelled`] as soon as `cancel` fires; the
    /// request is dropped mid-flight.
    #[instrument(skip(self, cancel))]
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, cancel: &CancelToken) -> Result<T> {
        cancel.check()?;
        let url = self.url(path)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%url, "Request cancelled");
                Err(CacheError::Cancelled)
            }
            result = self.fetch(url.clone()) => result,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let mut request = self.http_client.get(url.clone()).header(ACCEPT, "application/json");
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = error_detail(&text);
            warn!(%url, status = status.as_u16(), body = %body, "Request failed");
            return Err(CacheError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        debug!(%url, bytes = bytes.len(), "Received response");

        serde_json::from_slice(&bytes).map_err(|e| CacheError::Decode(e.to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> CacheError {
        if e.is_timeout() {
            CacheError::Timeout {
                seconds: self.config.timeout_seconds,
            }
        } else {
            CacheError::Http(e.to_string())
        }
    }
}

/// Extracts a readable message from an error body.
///
/// Prefers a JSON `detail` string, otherwise the raw text, truncated.
fn error_detail(text: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string));

    let message = detail.unwrap_or_else(|| text.trim().to_string());
    if message.chars().count() > MAX_ERROR_BODY_CHARS {
        let mut truncated: String = message.chars().take(MAX_ERROR_BODY_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        message
    }
}
