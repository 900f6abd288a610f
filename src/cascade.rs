//! Cascade evaluator.
//!
//! Evaluates one URL through the tiers in strict order:
//!
//! 1. allow list  -> `{false, 0.01, Allowlist}`
//! 2. deny list   -> `{true, 0.99, Denylist}`
//! 3. result cache -> the cached verdict, `Cache`
//! 4. classifier  -> `Model` (ledger upsert always, cache write if positive),
//!    or `{false, 0.0, Error}` when the classifier is unavailable or times out.
//!
//! Each tier only runs if every earlier tier missed. Collaborator failures
//! before the classifier fail open to the next tier; ledger and cache write
//! failures after a classification are logged and never change the outcome.

use std::sync::Arc;

use crate::classifier::{Classifier, NilPageFetcher, PageFetcher};
use crate::config::CascadeOptions;
use crate::domain::{self, Domain};
use crate::matcher::VerdictMatcher;
use crate::singleflight::SingleFlight;
use crate::store::{Ledger, ResultCache, VerdictStore};
use crate::types::{CachedVerdict, LedgerEntry, Outcome, Partition, Prediction};

/// Result of one cascade stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage<T> {
    /// The stage produced a terminal result
    Matched(T),
    /// Fall through to the next stage
    Missed,
}

/// External collaborators, constructed once at startup and shared.
#[derive(Clone)]
pub struct Collaborators {
    pub verdict_store: Arc<dyn VerdictStore>,
    pub cache: Arc<dyn ResultCache>,
    pub classifier: Arc<dyn Classifier>,
    pub ledger: Arc<dyn Ledger>,
    pub page_fetcher: Arc<dyn PageFetcher>,
}

impl Collaborators {
    /// Collaborators without a page fetcher; ledger entries carry no snapshot.
    pub fn new(
        verdict_store: Arc<dyn VerdictStore>,
        cache: Arc<dyn ResultCache>,
        classifier: Arc<dyn Classifier>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            verdict_store,
            cache,
            classifier,
            ledger,
            page_fetcher: Arc::new(NilPageFetcher),
        }
    }

    /// Set the page fetcher used for ledger snapshots.
    pub fn with_page_fetcher(mut self, page_fetcher: Arc<dyn PageFetcher>) -> Self {
        self.page_fetcher = page_fetcher;
        self
    }
}

/// Single-URL cascade evaluator.
pub struct CascadeEvaluator {
    matcher: VerdictMatcher,
    cache: Arc<dyn ResultCache>,
    classifier: Arc<dyn Classifier>,
    ledger: Arc<dyn Ledger>,
    page_fetcher: Arc<dyn PageFetcher>,
    options: CascadeOptions,
    in_flight: Option<SingleFlight>,
}

impl CascadeEvaluator {
    pub fn new(collaborators: Collaborators, options: CascadeOptions) -> Self {
        let matcher = VerdictMatcher::new(collaborators.verdict_store)
            .with_patterns(options.enable_patterns)
            .with_pattern_cache_size(options.pattern_cache_size);

        let in_flight = options.coalesce_duplicates.then(SingleFlight::new);

        Self {
            matcher,
            cache: collaborators.cache,
            classifier: collaborators.classifier,
            ledger: collaborators.ledger,
            page_fetcher: collaborators.page_fetcher,
            options,
            in_flight,
        }
    }

    pub fn options(&self) -> &CascadeOptions {
        &self.options
    }

    /// The verdict matcher, for callers that only need the list status.
    pub fn matcher(&self) -> &VerdictMatcher {
        &self.matcher
    }

    /// Evaluate one URL. Never fails: every failure path is a defined `Outcome`.
    pub async fn evaluate(&self, url: &str) -> Outcome {
        match &self.in_flight {
            Some(flight) => flight.run(url, move || self.run_cascade(url)).await,
            None => self.run_cascade(url).await,
        }
    }

    async fn run_cascade(&self, url: &str) -> Outcome {
        tracing::debug!(url, "evaluating");

        // Normalized once; an unparsable URL misses both list stages.
        let domain = domain::extract(url);

        for partition in Partition::PRECEDENCE {
            if let Stage::Matched(outcome) = self.list_stage(partition, domain.as_ref()).await {
                tracing::info!(url, source = %outcome.source(), "list hit");
                return outcome;
            }
        }

        if let Stage::Matched(outcome) = self.cache_stage(url).await {
            tracing::info!(
                url,
                is_positive = outcome.is_positive(),
                confidence = outcome.confidence(),
                "cache hit"
            );
            return outcome;
        }

        self.classify_stage(url).await
    }

    async fn list_stage(&self, partition: Partition, domain: Option<&Domain>) -> Stage<Outcome> {
        let Some(domain) = domain else {
            return Stage::Missed;
        };
        if !self.matcher.check(partition, domain).await {
            return Stage::Missed;
        }
        Stage::Matched(match partition {
            Partition::Allow => Outcome::allowlisted(),
            Partition::Deny => Outcome::denylisted(),
        })
    }

    async fn cache_stage(&self, url: &str) -> Stage<Outcome> {
        match self.cache.get(url).await {
            Ok(Some(verdict)) => match verdict.sanitized() {
                Some(verdict) => Stage::Matched(Outcome::from_cache(&verdict)),
                None => {
                    tracing::warn!(url, "cached verdict has no usable confidence, treating as miss");
                    Stage::Missed
                }
            },
            Ok(None) => {
                tracing::debug!(url, "cache miss");
                Stage::Missed
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "cache lookup failed, treating as miss");
                Stage::Missed
            }
        }
    }

    async fn classify_stage(&self, url: &str) -> Outcome {
        let Some(prediction) = self.classify(url).await else {
            tracing::error!(url, "classifier unavailable");
            return Outcome::error();
        };

        tracing::info!(
            url,
            is_positive = prediction.is_positive,
            confidence = prediction.confidence,
            "model verdict"
        );

        // Both writes complete before returning; neither can change the outcome.
        tokio::join!(
            self.record_ledger(url, prediction),
            self.record_cache(url, prediction)
        );

        Outcome::from_model(prediction)
    }

    /// Invoke the classifier under the configured timeout.
    /// `None` covers unavailable, error, timeout and a NaN confidence.
    async fn classify(&self, url: &str) -> Option<Prediction> {
        let timeout = self.options.classifier_timeout;
        match tokio::time::timeout(timeout, self.classifier.classify(url)).await {
            Ok(Ok(Some(prediction))) => prediction.sanitized(),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                tracing::warn!(url, error = %e, "classifier failed");
                None
            }
            Err(_) => {
                tracing::warn!(url, timeout_ms = timeout.as_millis() as u64, "classifier timed out");
                None
            }
        }
    }

    async fn record_ledger(&self, url: &str, prediction: Prediction) {
        let snapshot = if self.options.fetch_snapshots {
            self.snapshot(url).await
        } else {
            None
        };

        let entry = LedgerEntry::new(url, prediction).with_snapshot(snapshot);
        if let Err(e) = self.ledger.upsert(entry).await {
            tracing::error!(url, error = %e, "ledger write failed");
        }
    }

    /// Only positive verdicts are cached; a negative one could outlive a model update.
    async fn record_cache(&self, url: &str, prediction: Prediction) {
        if !prediction.is_positive {
            return;
        }
        let verdict = CachedVerdict::from(prediction);
        match self.cache.set(url, &verdict, self.options.cache_ttl).await {
            Ok(()) => tracing::debug!(url, "cached positive verdict"),
            Err(e) => tracing::error!(url, error = %e, "cache write failed"),
        }
    }

    async fn snapshot(&self, url: &str) -> Option<String> {
        match self.page_fetcher.fetch(url).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(url, error = %e, "page snapshot unavailable");
                None
            }
        }
    }
}
