//! HTTP page fetcher.
//!
//! Fetches raw page content with a blocking `ureq` agent on the blocking
//! thread pool. Scheme-less URLs are tried over http first, then https.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;

use super::PageFetcher;
use crate::error::{CascadeError, Result};

/// Default per-request timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Default number of attempts per URL
pub const DEFAULT_FETCH_RETRIES: usize = 2;

/// Upper bound on stored page size
const MAX_BODY_BYTES: u64 = 2 * 1024 * 1024;

/// Page fetcher over plain HTTP(S).
#[derive(Clone)]
pub struct HttpPageFetcher {
    agent: ureq::Agent,
    retries: usize,
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        Self::with_options(DEFAULT_FETCH_TIMEOUT, DEFAULT_FETCH_RETRIES)
    }

    /// Create a fetcher with an explicit timeout and attempt count (at least one).
    pub fn with_options(timeout: Duration, retries: usize) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            retries: retries.max(1),
        }
    }

    /// Candidate URLs to try, in order.
    fn candidates(url: &str) -> Vec<String> {
        let url = url.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            vec![url.to_string()]
        } else {
            vec![format!("http://{}", url), format!("https://{}", url)]
        }
    }

    fn fetch_blocking(agent: &ureq::Agent, url: &str) -> Result<String> {
        let response = agent
            .get(url)
            .call()
            .map_err(|e| CascadeError::Fetch(format!("GET {} failed: {}", url, e)))?;

        let (_, body) = response.into_parts();
        let mut reader = body.into_reader().take(MAX_BODY_BYTES);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<String>> {
        let agent = self.agent.clone();
        let candidates = Self::candidates(url);
        let retries = self.retries;

        tokio::task::spawn_blocking(move || {
            let mut last_err = None;
            for attempt in 1..=retries {
                for candidate in &candidates {
                    match Self::fetch_blocking(&agent, candidate) {
                        Ok(body) if body.trim().is_empty() => return Ok(None),
                        Ok(body) => return Ok(Some(body)),
                        Err(e) => {
                            tracing::debug!(url = %candidate, attempt, error = %e, "page fetch attempt failed");
                            last_err = Some(e);
                        }
                    }
                }
            }
            Err(last_err
                .unwrap_or_else(|| CascadeError::Fetch("no fetch attempted".to_string())))
        })
        .await
        .map_err(|e| CascadeError::Fetch(format!("fetch task failed: {}", e)))?
    }
}
