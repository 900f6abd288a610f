//! Collaborator interfaces for the cascade and their in-memory implementations.
//!
//! Backends (Redis, SQL, ...) implement these traits outside this crate.
//! Every call is a potential suspension point; implementations provide their
//! own internal consistency.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CachedVerdict, LedgerEntry, Partition};

mod loader;
mod memory;

pub use loader::{load_verdict_lists, parse_verdict_list, parse_verdict_list_file, VerdictList};
pub use memory::{MemoryLedger, MemoryResultCache, MemoryVerdictStore, DEFAULT_CACHE_CAPACITY};

/// Allow/deny list membership, keyed by registrable domain.
#[async_trait]
pub trait VerdictStore: Send + Sync {
    /// Exact-set membership test.
    async fn is_member(&self, partition: Partition, domain: &str) -> Result<bool>;

    /// All patterns of a partition.
    async fn pattern_members(&self, partition: Partition) -> Result<Vec<String>>;
}

/// Expiring store of previously computed verdicts, keyed by the original URL string.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// `Ok(None)` is a miss, including an expired entry.
    async fn get(&self, url: &str) -> Result<Option<CachedVerdict>>;

    async fn set(&self, url: &str, verdict: &CachedVerdict, ttl: Duration) -> Result<()>;
}

/// Durable sink of classifier decisions. Upserts by URL; the latest write wins.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn upsert(&self, entry: LedgerEntry) -> Result<()>;

    /// Most recent positive entries, newest first. Used for cache warm-up only,
    /// never by the cascade itself. Sinks that cannot be read return nothing.
    async fn recent_positives(&self, _limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(Vec::new())
    }
}

/// Re-seed the result cache from the newest positive ledger entries.
///
/// Returns the number of entries written. Individual cache failures are
/// logged and skipped.
pub async fn warm_cache(
    ledger: &dyn Ledger,
    cache: &dyn ResultCache,
    limit: usize,
    ttl: Duration,
) -> Result<usize> {
    let entries = ledger.recent_positives(limit).await?;

    let mut count = 0;
    for entry in entries {
        let verdict = CachedVerdict {
            is_positive: entry.is_positive,
            confidence: entry.confidence,
            observed_at: entry.observed_at,
        };
        match cache.set(&entry.url, &verdict, ttl).await {
            Ok(()) => count += 1,
            Err(e) => tracing::warn!(url = %entry.url, error = %e, "cache warm-up write failed"),
        }
    }

    tracing::info!(count, "warmed result cache from ledger");
    Ok(count)
}
