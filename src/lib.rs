//! Phish Cascade - a layered decision cascade for phishing URL detection
//!
//! A URL is resolved by the first tier that produces an answer:
//! - Allow list (exact registrable domain, then patterns)
//! - Deny list (exact registrable domain, then patterns)
//! - Result cache of earlier positive classifier verdicts
//! - Classifier, bounded by a timeout
//!
//! Every evaluation returns an [`Outcome`] naming the tier that decided it.
//! Classifier results are recorded in a [`Ledger`]; positive ones are also
//! cached.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use phish_cascade::{
//!     CascadeEvaluator, CascadeOptions, Collaborators, MemoryLedger, MemoryResultCache,
//!     MemoryVerdictStore, NilClassifier, Partition, Source,
//! };
//!
//! # tokio_test_block_on(async {
//! let store = MemoryVerdictStore::new()
//!     .with_domain(Partition::Allow, "google.com")
//!     .with_pattern(Partition::Deny, "*.phish-kit.net");
//!
//! let collaborators = Collaborators::new(
//!     Arc::new(store),
//!     Arc::new(MemoryResultCache::default()),
//!     Arc::new(NilClassifier),
//!     Arc::new(MemoryLedger::new()),
//! );
//! let cascade = CascadeEvaluator::new(collaborators, CascadeOptions::default());
//!
//! let outcome = cascade.evaluate("https://mail.google.com/inbox").await;
//! assert_eq!(outcome.source(), Source::Allowlist);
//!
//! let outcome = cascade.evaluate("login.phish-kit.net").await;
//! assert!(outcome.is_positive());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! # Verdict list syntax
//!
//! One entry per line; `#` starts a comment.
//!
//! | Entry | Example | Matches |
//! |-------|---------|---------|
//! | Domain | `example.com` | Registrable domain `example.com` |
//! | URL | `https://www.example.com/x` | Reduced to `example.com` |
//! | Wildcard | `*.example.com` | `example.com` and every domain ending in `.example.com` |
//! | Glob | `paypa?-*.com` | Shell-style glob over the registrable domain |
//! | Include | `file:lists/extra.txt` | Entries of another list file |

pub mod batch;
pub mod cascade;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod matcher;
mod singleflight;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use batch::BatchCoordinator;
pub use cascade::{CascadeEvaluator, Collaborators, Stage};
pub use classifier::{Classifier, NilClassifier, NilPageFetcher, PageFetcher};
pub use config::{
    CascadeConfig, CascadeOptions, DEFAULT_CACHE_TTL, DEFAULT_CLASSIFIER_TIMEOUT,
    DEFAULT_MAX_IN_FLIGHT,
};
pub use domain::{extract, Domain};
pub use error::{CascadeError, Result, StoreErrorKind};
pub use matcher::{match_pattern, DomainPattern, VerdictMatcher};
pub use store::{
    load_verdict_lists, parse_verdict_list, parse_verdict_list_file, warm_cache, Ledger,
    MemoryLedger, MemoryResultCache, MemoryVerdictStore, ResultCache, VerdictList, VerdictStore,
};
pub use types::{CachedVerdict, LedgerEntry, ListMatch, Outcome, Partition, Prediction, Source};

#[cfg(feature = "http")]
pub use classifier::HttpPageFetcher;
