//! Cascade configuration.
//!
//! `CascadeOptions` is the in-process builder; `CascadeConfig` is its
//! file/environment form.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CascadeError, Result};
use crate::matcher::DEFAULT_PATTERN_CACHE_SIZE;

/// Default result cache TTL: 24 hours
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default classifier timeout
pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on simultaneously in-flight evaluations in a batch
pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

/// Cascade options.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOptions {
    /// TTL for positive verdicts written to the result cache
    pub cache_ttl: Duration,
    /// Bound on a single classifier invocation; exceeding it counts as unavailable
    pub classifier_timeout: Duration,
    /// Consult pattern sets after an exact-set miss
    pub enable_patterns: bool,
    /// Fetch a page snapshot for the ledger after a classification
    pub fetch_snapshots: bool,
    /// Share one in-progress evaluation between concurrent requests for the same URL
    pub coalesce_duplicates: bool,
    /// Batch backpressure: simultaneously in-flight evaluations (0 = unbounded)
    pub max_in_flight: usize,
    /// Number of compiled patterns kept in memory
    pub pattern_cache_size: usize,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            classifier_timeout: DEFAULT_CLASSIFIER_TIMEOUT,
            enable_patterns: true,
            fetch_snapshots: true,
            coalesce_duplicates: false,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            pattern_cache_size: DEFAULT_PATTERN_CACHE_SIZE,
        }
    }
}

impl CascadeOptions {
    /// Create new cascade options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the classifier timeout.
    pub fn with_classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = timeout;
        self
    }

    /// Enable or disable pattern matching.
    pub fn with_patterns(mut self, enabled: bool) -> Self {
        self.enable_patterns = enabled;
        self
    }

    /// Enable or disable page snapshots for the ledger.
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.fetch_snapshots = enabled;
        self
    }

    /// Enable or disable single-flight coalescing of duplicate URLs.
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_duplicates = enabled;
        self
    }

    /// Set the batch in-flight cap (0 = unbounded).
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Set the compiled pattern cache size.
    pub fn with_pattern_cache_size(mut self, size: usize) -> Self {
        self.pattern_cache_size = size;
        self
    }
}

/// Serializable configuration. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CascadeConfig {
    pub cache_ttl_secs: u64,
    pub classifier_timeout_secs: u64,
    pub enable_patterns: bool,
    pub fetch_snapshots: bool,
    pub coalesce_duplicates: bool,
    pub max_in_flight: usize,
    pub pattern_cache_size: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        let options = CascadeOptions::default();
        Self {
            cache_ttl_secs: options.cache_ttl.as_secs(),
            classifier_timeout_secs: options.classifier_timeout.as_secs(),
            enable_patterns: options.enable_patterns,
            fetch_snapshots: options.fetch_snapshots,
            coalesce_duplicates: options.coalesce_duplicates,
            max_in_flight: options.max_in_flight,
            pattern_cache_size: options.pattern_cache_size,
        }
    }
}

impl CascadeConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            CascadeError::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PHISH_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("PHISH_CACHE_TTL") {
            self.cache_ttl_secs = parse_env("PHISH_CACHE_TTL", &v)?;
        }
        if let Some(v) = lookup("PHISH_CLASSIFIER_TIMEOUT") {
            self.classifier_timeout_secs = parse_env("PHISH_CLASSIFIER_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("PHISH_ENABLE_PATTERNS") {
            self.enable_patterns = parse_env("PHISH_ENABLE_PATTERNS", &v)?;
        }
        if let Some(v) = lookup("PHISH_FETCH_SNAPSHOTS") {
            self.fetch_snapshots = parse_env("PHISH_FETCH_SNAPSHOTS", &v)?;
        }
        if let Some(v) = lookup("PHISH_COALESCE") {
            self.coalesce_duplicates = parse_env("PHISH_COALESCE", &v)?;
        }
        if let Some(v) = lookup("PHISH_MAX_IN_FLIGHT") {
            self.max_in_flight = parse_env("PHISH_MAX_IN_FLIGHT", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 {
            return Err(CascadeError::Config("cache_ttl_secs must be positive".into()));
        }
        if self.classifier_timeout_secs == 0 {
            return Err(CascadeError::Config(
                "classifier_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn into_options(self) -> CascadeOptions {
        CascadeOptions {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            classifier_timeout: Duration::from_secs(self.classifier_timeout_secs),
            enable_patterns: self.enable_patterns,
            fetch_snapshots: self.fetch_snapshots,
            coalesce_duplicates: self.coalesce_duplicates,
            max_in_flight: self.max_in_flight,
            pattern_cache_size: self.pattern_cache_size,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CascadeError::Config(format!("Invalid value for {}: {}", key, value)))
}
