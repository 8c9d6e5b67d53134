//! Public key retrieval for callback verification
//!
//! The storage service tells the application where to download the PEM
//! public key for each callback. Fetchers are pluggable so that verification
//! can run against a fixed key (tests, offline replay) or with a time-bounded
//! cache in front of the HTTP fetch.

use async_trait::async_trait;
use ossgate_common::VerifierConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Default connect timeout for key downloads
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Public key fetch errors
#[derive(Debug, thiserror::Error)]
pub enum KeyFetchError {
    #[error("invalid public key url: {0}")]
    InvalidUrl(String),
    #[error("public key request timed out")]
    Timeout,
    #[error("public key request failed: {0}")]
    Http(String),
    #[error("public key response was empty")]
    EmptyBody,
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

/// Source of PEM-encoded public keys
#[async_trait]
pub trait PublicKeyFetcher: Send + Sync {
    /// Fetch the PEM document at `url`
    async fn fetch(&self, url: &str) -> Result<String, KeyFetchError>;
}

#[async_trait]
impl<F: PublicKeyFetcher + ?Sized> PublicKeyFetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> Result<String, KeyFetchError> {
        (**self).fetch(url).await
    }
}

/// Downloads public keys over HTTP
pub struct HttpKeyFetcher {
    http_client: reqwest::Client,
}

impl HttpKeyFetcher {
    /// Create a fetcher
    ///
    /// `connect_timeout` bounds connection establishment only; `timeout`
    /// bounds the whole request.
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self, KeyFetchError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| KeyFetchError::ConfigurationError(e.to_string()))?;
        Ok(Self { http_client })
    }

    pub fn from_config(config: &VerifierConfig) -> Result<Self, KeyFetchError> {
        Self::new(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl PublicKeyFetcher for HttpKeyFetcher {
    async fn fetch(&self, url: &str) -> Result<String, KeyFetchError> {
        let url = reqwest::Url::parse(url).map_err(|e| KeyFetchError::InvalidUrl(e.to_string()))?;

        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                KeyFetchError::Timeout
            } else {
                KeyFetchError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Http(format!(
                "key server returned status {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                KeyFetchError::Timeout
            } else {
                KeyFetchError::Http(e.to_string())
            }
        })?;

        if body.trim().is_empty() {
            return Err(KeyFetchError::EmptyBody);
        }
        Ok(body)
    }
}

/// Serves one fixed key regardless of URL
#[derive(Debug, Clone)]
pub struct StaticKeyFetcher {
    pem: String,
    fetches: Arc<AtomicUsize>,
}

impl StaticKeyFetcher {
    pub fn new(pem: impl Into<String>) -> Self {
        Self {
            pem: pem.into(),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of fetches served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublicKeyFetcher for StaticKeyFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, KeyFetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.pem.trim().is_empty() {
            return Err(KeyFetchError::EmptyBody);
        }
        Ok(self.pem.clone())
    }
}

/// Reuses fetched keys for a fixed time, keyed by URL
pub struct CachingKeyFetcher<F> {
    inner: F,
    ttl: Duration,
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl<F: PublicKeyFetcher> CachingKeyFetcher<F> {
    pub fn new(inner: F, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, url: &str) -> Option<String> {
        let entries = self.entries.read();
        entries.get(url).and_then(|(pem, fetched)| {
            if fetched.elapsed() < self.ttl {
                Some(pem.clone())
            } else {
                None
            }
        })
    }

    fn insert(&self, url: String, pem: String) {
        let mut entries = self.entries.write();
        // Only a handful of key URLs exist in practice
        if entries.len() > 64 {
            entries.retain(|_, (_, fetched)| fetched.elapsed() < self.ttl);
        }
        entries.insert(url, (pem, Instant::now()));
    }
}

#[async_trait]
impl<F: PublicKeyFetcher> PublicKeyFetcher for CachingKeyFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, KeyFetchError> {
        if let Some(pem) = self.get(url) {
            tracing::debug!("public key cache hit for {}", url);
            return Ok(pem);
        }
        let pem = self.inner.fetch(url).await?;
        self.insert(url.to_string(), pem.clone());
        Ok(pem)
    }
}
