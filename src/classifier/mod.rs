//! Classifier and page fetcher interfaces.
//!
//! The classifier is the expensive, unreliable tier of the cascade. How it
//! obtains page content (rendering, fetching) is its own business; the
//! cascade only bounds it with a timeout.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Prediction;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpPageFetcher, DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT};

/// Phishing classifier interface.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a URL.
    ///
    /// `Ok(None)` means the classifier could not produce a result (for
    /// example the page could not be rendered). Both `Ok(None)` and `Err`
    /// are treated as "classifier unavailable".
    async fn classify(&self, url: &str) -> Result<Option<Prediction>>;
}

/// Best-effort retrieval of page content for ledger enrichment.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// `Ok(None)` when the page has no usable content.
    async fn fetch(&self, url: &str) -> Result<Option<String>>;
}

/// Page fetcher that never returns content.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilPageFetcher;

impl NilPageFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PageFetcher for NilPageFetcher {
    async fn fetch(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Classifier that is never available.
///
/// Useful as a placeholder when only the list and cache tiers are wanted;
/// every miss then resolves to the error outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilClassifier;

impl NilClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Classifier for NilClassifier {
    async fn classify(&self, _url: &str) -> Result<Option<Prediction>> {
        Ok(None)
    }
}
