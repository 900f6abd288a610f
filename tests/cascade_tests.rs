//! Integration tests for the cascade and batch coordinator

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use phish_cascade::{
    BatchCoordinator, CachedVerdict, CascadeError, CascadeEvaluator, CascadeOptions, Classifier,
    Collaborators, Ledger, LedgerEntry, MemoryLedger, MemoryResultCache, MemoryVerdictStore,
    Outcome, Partition, Prediction, Result, ResultCache, Source, StoreErrorKind, VerdictStore,
};

/// What the scripted classifier does for a URL
#[derive(Clone, Copy)]
enum Script {
    Predict(bool, f64),
    Unavailable,
    Fail,
    Hang,
}

/// Classifier driven by a per-URL script; unknown URLs are benign.
#[derive(Default)]
struct ScriptedClassifier {
    script: HashMap<String, Script>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    fn with(mut self, url: &str, script: Script) -> Self {
        self.script.insert(url.to_string(), script);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, url: &str) -> Result<Option<Prediction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(url).copied().unwrap_or(Script::Predict(false, 0.1)) {
            Script::Predict(is_positive, confidence) => {
                Ok(Some(Prediction::new(is_positive, confidence)))
            }
            Script::Unavailable => Ok(None),
            Script::Fail => Err(CascadeError::Classifier("model server returned 500".into())),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Some(Prediction::new(true, 0.9)))
            }
        }
    }
}

/// Result cache that records every write with its TTL.
#[derive(Default)]
struct RecordingCache {
    inner: MemoryResultCache,
    writes: Mutex<Vec<(String, CachedVerdict, Duration)>>,
}

#[async_trait]
impl ResultCache for RecordingCache {
    async fn get(&self, url: &str) -> Result<Option<CachedVerdict>> {
        self.inner.get(url).await
    }

    async fn set(&self, url: &str, verdict: &CachedVerdict, ttl: Duration) -> Result<()> {
        self.writes
            .lock()
            .push((url.to_string(), verdict.clone(), ttl));
        self.inner.set(url, verdict, ttl).await
    }
}

/// Verdict store that is always down.
struct DownStore;

#[async_trait]
impl VerdictStore for DownStore {
    async fn is_member(&self, _partition: Partition, _domain: &str) -> Result<bool> {
        Err(CascadeError::store(StoreErrorKind::Unavailable, "connection refused"))
    }

    async fn pattern_members(&self, _partition: Partition) -> Result<Vec<String>> {
        Err(CascadeError::store(StoreErrorKind::Unavailable, "connection refused"))
    }
}

/// Ledger that is always down.
struct DownLedger;

#[async_trait]
impl Ledger for DownLedger {
    async fn upsert(&self, _entry: LedgerEntry) -> Result<()> {
        Err(CascadeError::store(StoreErrorKind::Unavailable, "database offline"))
    }
}

struct Harness {
    cascade: Arc<CascadeEvaluator>,
    classifier: Arc<ScriptedClassifier>,
    cache: Arc<RecordingCache>,
    ledger: Arc<MemoryLedger>,
}

fn harness(
    store: MemoryVerdictStore,
    classifier: ScriptedClassifier,
    options: CascadeOptions,
) -> Harness {
    init_tracing();
    let classifier = Arc::new(classifier);
    let cache = Arc::new(RecordingCache::default());
    let ledger = Arc::new(MemoryLedger::new());
    let collaborators = Collaborators::new(
        Arc::new(store),
        cache.clone(),
        classifier.clone(),
        ledger.clone(),
    );
    Harness {
        cascade: Arc::new(CascadeEvaluator::new(collaborators, options)),
        classifier,
        cache,
        ledger,
    }
}

/// Log output for a failing test; `RUST_LOG=phish_cascade=debug` to see it.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn lists() -> MemoryVerdictStore {
    MemoryVerdictStore::new()
        .with_domain(Partition::Allow, "google.com")
        .with_domain(Partition::Allow, "shared.com")
        .with_domain(Partition::Deny, "shared.com")
        .with_domain(Partition::Deny, "evil-login.com")
        .with_pattern(Partition::Deny, "*.phish-kit.net")
}

#[tokio::test]
async fn test_allow_overrides_deny() {
    let h = harness(lists(), ScriptedClassifier::default(), CascadeOptions::default());

    for url in ["https://shared.com", "http://www.shared.com/a", "shared.com"] {
        assert_eq!(h.cascade.evaluate(url).await, Outcome::allowlisted());
    }
    assert_eq!(h.classifier.calls(), 0);
}

#[tokio::test]
async fn test_deny_confidence_is_exact() {
    let h = harness(lists(), ScriptedClassifier::default(), CascadeOptions::default());

    let outcome = h.cascade.evaluate("https://secure.evil-login.com/verify").await;
    assert_eq!(outcome.source(), Source::Denylist);
    assert!(outcome.is_positive());
    assert_eq!(outcome.confidence(), 0.99);
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_cache_hit_skips_classifier() {
    let h = harness(lists(), ScriptedClassifier::default(), CascadeOptions::default());
    let url = "https://cached.example.com/x";
    h.cache
        .inner
        .set(url, &CachedVerdict::new(true, 0.77), Duration::from_secs(60))
        .await
        .unwrap();

    let outcome = h.cascade.evaluate(url).await;
    assert_eq!(outcome.source(), Source::Cache);
    assert!(outcome.is_positive());
    assert_eq!(outcome.confidence(), 0.77);
    assert_eq!(h.classifier.calls(), 0);
}

#[tokio::test]
async fn test_cache_not_consulted_for_list_hits() {
    let h = harness(lists(), ScriptedClassifier::default(), CascadeOptions::default());
    let url = "https://google.com";
    h.cache
        .inner
        .set(url, &CachedVerdict::new(true, 0.9), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(h.cascade.evaluate(url).await.source(), Source::Allowlist);
}

#[tokio::test]
async fn test_only_positive_verdicts_cached_with_configured_ttl() {
    let classifier = ScriptedClassifier::default()
        .with("https://bad.example.com", Script::Predict(true, 0.88))
        .with("https://fine.example.com", Script::Predict(false, 0.15));
    let ttl = Duration::from_secs(3600);
    let h = harness(lists(), classifier, CascadeOptions::new().with_cache_ttl(ttl));

    h.cascade.evaluate("https://bad.example.com").await;
    h.cascade.evaluate("https://fine.example.com").await;

    let writes = h.cache.writes.lock().clone();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "https://bad.example.com");
    assert!(writes[0].1.is_positive);
    assert_eq!(writes[0].2, ttl);

    // Both verdicts are in the ledger
    assert_eq!(h.ledger.len(), 2);
}

#[tokio::test]
async fn test_model_positive_then_cache() {
    let classifier =
        ScriptedClassifier::default().with("https://bad.example.com", Script::Predict(true, 0.88));
    let h = harness(lists(), classifier, CascadeOptions::default());

    let first = h.cascade.evaluate("https://bad.example.com").await;
    let second = h.cascade.evaluate("https://bad.example.com").await;
    assert_eq!(first.source(), Source::Model);
    assert_eq!(second.source(), Source::Cache);
    assert_eq!(first.confidence(), second.confidence());
    assert_eq!(first.is_positive(), second.is_positive());
    assert_eq!(h.classifier.calls(), 1);
}

#[tokio::test]
async fn test_classifier_unavailable_or_failing_is_error_without_ledger() {
    let classifier = ScriptedClassifier::default()
        .with("https://a.example.com", Script::Unavailable)
        .with("https://b.example.com", Script::Fail);
    let h = harness(lists(), classifier, CascadeOptions::default());

    for url in ["https://a.example.com", "https://b.example.com"] {
        let outcome = h.cascade.evaluate(url).await;
        assert!(!outcome.is_positive());
        assert_eq!(outcome.confidence(), 0.0);
        assert_eq!(outcome.source(), Source::Error);
    }
    assert!(h.ledger.is_empty());
    assert!(h.cache.writes.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_classifier_timeout_is_error() {
    let classifier = ScriptedClassifier::default().with("https://slow.example.com", Script::Hang);
    let options = CascadeOptions::new().with_classifier_timeout(Duration::from_secs(5));
    let h = harness(lists(), classifier, options);

    let outcome = h.cascade.evaluate("https://slow.example.com").await;
    assert_eq!(outcome, Outcome::error());
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_store_down_fails_open_to_classifier() {
    init_tracing();
    let classifier = Arc::new(
        ScriptedClassifier::default().with("https://google.com", Script::Predict(false, 0.05)),
    );
    let collaborators = Collaborators::new(
        Arc::new(DownStore),
        Arc::new(MemoryResultCache::default()),
        classifier.clone(),
        Arc::new(MemoryLedger::new()),
    );
    let cascade = CascadeEvaluator::new(collaborators, CascadeOptions::default());

    let outcome = cascade.evaluate("https://google.com").await;
    assert_eq!(outcome.source(), Source::Model);
    assert_eq!(classifier.calls(), 1);
}

#[tokio::test]
async fn test_ledger_down_does_not_change_outcome() {
    init_tracing();
    let classifier =
        ScriptedClassifier::default().with("https://bad.example.com", Script::Predict(true, 0.91));
    let cache = Arc::new(MemoryResultCache::default());
    let collaborators = Collaborators::new(
        Arc::new(lists()),
        cache.clone(),
        Arc::new(classifier),
        Arc::new(DownLedger),
    );
    let cascade = CascadeEvaluator::new(collaborators, CascadeOptions::default());

    let outcome = cascade.evaluate("https://bad.example.com").await;
    assert_eq!(outcome.source(), Source::Model);
    assert_eq!(outcome.confidence(), 0.91);
    assert!(cache.get("https://bad.example.com").await.unwrap().is_some());
}

#[tokio::test]
async fn test_patterns_disabled() {
    let h = harness(
        lists(),
        ScriptedClassifier::default(),
        CascadeOptions::new().with_patterns(false),
    );

    let outcome = h.cascade.evaluate("https://x.phish-kit.net").await;
    assert_eq!(outcome.source(), Source::Model);
}

#[tokio::test]
async fn test_batch_sources_in_input_order() {
    let classifier = ScriptedClassifier::default()
        .with("https://fresh.example.com", Script::Predict(true, 0.83));
    let h = harness(lists(), classifier, CascadeOptions::default());
    h.cache
        .inner
        .set(
            "https://seen.example.com",
            &CachedVerdict::new(true, 0.7),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

    let batch = BatchCoordinator::new(h.cascade.clone());
    let outcomes = batch
        .evaluate_many(&[
            "https://mail.google.com",
            "https://a.phish-kit.net",
            "https://seen.example.com",
            "https://fresh.example.com",
        ])
        .await;

    let sources: Vec<Source> = outcomes.iter().map(|o| o.source()).collect();
    assert_eq!(
        sources,
        vec![Source::Allowlist, Source::Denylist, Source::Cache, Source::Model]
    );
}

#[tokio::test]
async fn test_coalescing_shares_one_classification() {
    struct SlowClassifier(AtomicUsize);

    #[async_trait]
    impl Classifier for SlowClassifier {
        async fn classify(&self, _url: &str) -> Result<Option<Prediction>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(Some(Prediction::new(false, 0.3)))
        }
    }

    let classifier = Arc::new(SlowClassifier(AtomicUsize::new(0)));
    let collaborators = Collaborators::new(
        Arc::new(lists()),
        Arc::new(MemoryResultCache::default()),
        classifier.clone(),
        Arc::new(MemoryLedger::new()),
    );
    let cascade = Arc::new(CascadeEvaluator::new(
        collaborators,
        CascadeOptions::new()
            .with_coalescing(true)
            .with_max_in_flight(0),
    ));

    let urls = vec!["https://burst.example.com"; 6];
    let outcomes = BatchCoordinator::new(cascade).evaluate_many(&urls).await;

    assert!(outcomes.iter().all(|o| *o == outcomes[0]));
    assert_eq!(outcomes[0].source(), Source::Model);
    assert_eq!(classifier.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_without_coalescing_duplicates_classify_independently() {
    let h = harness(lists(), ScriptedClassifier::default(), CascadeOptions::default());

    let urls = vec!["https://dup.example.com"; 3];
    BatchCoordinator::new(h.cascade.clone())
        .evaluate_many(&urls)
        .await;
    assert_eq!(h.classifier.calls(), 3);
}
