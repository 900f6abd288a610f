use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use super::loader::VerdictList;
use super::{Ledger, ResultCache, VerdictStore};
use crate::domain;
use crate::error::Result;
use crate::types::{CachedVerdict, LedgerEntry, Partition};

/// Default capacity of the in-memory result cache
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// In-memory verdict store.
///
/// Lists are replaced or edited through the administrative methods; the
/// cascade only reads.
#[derive(Default)]
pub struct MemoryVerdictStore {
    allow: RwLock<VerdictList>,
    deny: RwLock<VerdictList>,
}

impl MemoryVerdictStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, partition: Partition) -> &RwLock<VerdictList> {
        match partition {
            Partition::Allow => &self.allow,
            Partition::Deny => &self.deny,
        }
    }

    /// Replace a whole partition.
    pub fn replace(&self, partition: Partition, list: VerdictList) {
        *self.list(partition).write() = list;
    }

    /// Add an exact domain, reduced to its registrable domain like list file
    /// entries are. Returns false if already present or not registrable.
    pub fn add_domain(&self, partition: Partition, domain: &str) -> bool {
        let Some(domain) = domain::extract(domain) else {
            tracing::warn!(domain, %partition, "not a registrable domain, ignored");
            return false;
        };
        self.list(partition)
            .write()
            .domains
            .insert(domain.into_string())
    }

    pub fn remove_domain(&self, partition: Partition, domain: &str) -> bool {
        let Some(domain) = domain::extract(domain) else {
            return false;
        };
        self.list(partition).write().domains.remove(domain.as_str())
    }

    /// Add a pattern. Returns false if already present.
    pub fn add_pattern(&self, partition: Partition, pattern: &str) -> bool {
        self.list(partition)
            .write()
            .patterns
            .insert(pattern.to_lowercase())
    }

    pub fn remove_pattern(&self, partition: Partition, pattern: &str) -> bool {
        self.list(partition)
            .write()
            .patterns
            .remove(&pattern.to_lowercase())
    }

    /// Builder form of `add_domain` for setup code.
    pub fn with_domain(self, partition: Partition, domain: &str) -> Self {
        self.add_domain(partition, domain);
        self
    }

    /// Builder form of `add_pattern` for setup code.
    pub fn with_pattern(self, partition: Partition, pattern: &str) -> Self {
        self.add_pattern(partition, pattern);
        self
    }

    /// Number of (domains, patterns) in a partition.
    pub fn len(&self, partition: Partition) -> (usize, usize) {
        let list = self.list(partition).read();
        (list.domains.len(), list.patterns.len())
    }
}

#[async_trait]
impl VerdictStore for MemoryVerdictStore {
    async fn is_member(&self, partition: Partition, domain: &str) -> Result<bool> {
        Ok(self.list(partition).read().domains.contains(domain))
    }

    async fn pattern_members(&self, partition: Partition) -> Result<Vec<String>> {
        Ok(self.list(partition).read().patterns.iter().cloned().collect())
    }
}

/// Cache value: the verdict and when it stops being served
type CacheValue = (CachedVerdict, Instant);

/// In-memory result cache with per-entry expiry and LRU eviction.
pub struct MemoryResultCache {
    entries: Mutex<LruCache<String, CacheValue>>,
}

impl MemoryResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for MemoryResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, url: &str) -> Result<Option<CachedVerdict>> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(url) {
            Some((verdict, expires_at)) if Instant::now() < *expires_at => {
                return Ok(Some(verdict.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(url);
        }
        Ok(None)
    }

    async fn set(&self, url: &str, verdict: &CachedVerdict, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .put(url.to_string(), (verdict.clone(), expires_at));
        Ok(())
    }
}

/// In-memory ledger keyed by URL.
#[derive(Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<String, LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<LedgerEntry> {
        self.entries.read().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries ordered newest first, paginated.
    pub fn recent(&self, limit: usize, offset: usize) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        entries.into_iter().skip(offset).take(limit).collect()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn upsert(&self, entry: LedgerEntry) -> Result<()> {
        let mut entries = self.entries.write();
        match entries.get_mut(&entry.url) {
            Some(existing) => {
                existing.is_positive = entry.is_positive;
                existing.confidence = entry.confidence;
                existing.observed_at = entry.observed_at;
                // A failed snapshot fetch does not erase an earlier snapshot
                if entry.page_snapshot.is_some() {
                    existing.page_snapshot = entry.page_snapshot;
                }
            }
            None => {
                entries.insert(entry.url.clone(), entry);
            }
        }
        Ok(())
    }

    async fn recent_positives(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let mut positives: Vec<LedgerEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| e.is_positive)
            .cloned()
            .collect();
        positives.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        positives.truncate(limit);
        Ok(positives)
    }
}
