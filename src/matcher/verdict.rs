use std::sync::Arc;

use super::pattern::PatternCache;
use crate::domain::{self, Domain};
use crate::store::VerdictStore;
use crate::types::{ListMatch, Partition};

/// Default number of compiled patterns kept in memory
pub const DEFAULT_PATTERN_CACHE_SIZE: usize = 1024;

/// Checks URLs against the allow and deny partitions of a verdict store.
///
/// Precedence is load-bearing: ALLOW is consulted before DENY and the first
/// partition that matches wins, so a manual allow entry always overrides a
/// deny entry for the same domain. Store failures fail open (no match).
pub struct VerdictMatcher {
    store: Arc<dyn VerdictStore>,
    patterns: PatternCache,
    enable_patterns: bool,
}

impl VerdictMatcher {
    pub fn new(store: Arc<dyn VerdictStore>) -> Self {
        Self {
            store,
            patterns: PatternCache::new(DEFAULT_PATTERN_CACHE_SIZE),
            enable_patterns: true,
        }
    }

    /// Enable or disable the pattern-set check.
    pub fn with_patterns(mut self, enabled: bool) -> Self {
        self.enable_patterns = enabled;
        self
    }

    /// Set the compiled pattern cache size.
    pub fn with_pattern_cache_size(mut self, size: usize) -> Self {
        self.patterns = PatternCache::new(size);
        self
    }

    /// Classify a URL's domain: ALLOW, DENY or NONE.
    ///
    /// Unparsable URLs yield NONE; the deny partition is not consulted
    /// when the allow partition already matched.
    pub async fn domain_status(&self, url: &str) -> ListMatch {
        let Some(domain) = domain::extract(url) else {
            return ListMatch::None;
        };

        for partition in Partition::PRECEDENCE {
            if self.check(partition, &domain).await {
                return partition.into();
            }
        }
        ListMatch::None
    }

    /// Single-partition check for the allow list.
    pub async fn is_allowed(&self, url: &str) -> bool {
        self.check_url(Partition::Allow, url).await
    }

    /// Single-partition check for the deny list.
    pub async fn is_denied(&self, url: &str) -> bool {
        self.check_url(Partition::Deny, url).await
    }

    async fn check_url(&self, partition: Partition, url: &str) -> bool {
        match domain::extract(url) {
            Some(domain) => self.check(partition, &domain).await,
            None => false,
        }
    }

    /// Check an already normalized domain against one partition.
    ///
    /// At most two store round trips: exact membership, then the pattern set
    /// if patterns are enabled and the exact check missed.
    pub async fn check(&self, partition: Partition, domain: &Domain) -> bool {
        let domain = domain.as_str();

        match self.store.is_member(partition, domain).await {
            Ok(true) => {
                tracing::info!(domain, %partition, "domain found in exact set");
                return true;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(domain, %partition, error = %e, "exact-set lookup failed, treating as no match");
            }
        }

        if !self.enable_patterns {
            return false;
        }

        let patterns = match self.store.pattern_members(partition).await {
            Ok(patterns) => patterns,
            Err(e) => {
                tracing::warn!(%partition, error = %e, "pattern-set fetch failed, treating as empty");
                return false;
            }
        };

        for pattern in &patterns {
            let Some(compiled) = self.patterns.get(pattern) else {
                continue;
            };
            if compiled.matches(domain) {
                tracing::info!(domain, %partition, pattern = %pattern, "domain matches pattern");
                return true;
            }
        }

        false
    }
}
