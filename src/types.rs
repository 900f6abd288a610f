use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence reported for an allow-list hit. Policy constant, not computed.
pub const ALLOWLIST_CONFIDENCE: f64 = 0.01;

/// Confidence reported for a deny-list hit. Policy constant, not computed.
pub const DENYLIST_CONFIDENCE: f64 = 0.99;

/// Confidence reported with `Source::Error`. Only that outcome carries exactly zero.
pub const ERROR_CONFIDENCE: f64 = 0.0;

/// Smallest confidence a model outcome may carry, keeping zero reserved for errors.
pub const MIN_MODEL_CONFIDENCE: f64 = 1e-6;

/// Probability at or above which the classifier output counts as phishing.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Verdict list partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Allow,
    Deny,
}

impl Partition {
    /// Partitions in precedence order: an allow entry always overrides a deny entry.
    pub const PRECEDENCE: [Partition; 2] = [Partition::Allow, Partition::Deny];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Allow => "allow",
            Partition::Deny => "deny",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking a URL against both verdict lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMatch {
    Allow,
    Deny,
    None,
}

impl From<Partition> for ListMatch {
    fn from(partition: Partition) -> Self {
        match partition {
            Partition::Allow => ListMatch::Allow,
            Partition::Deny => ListMatch::Deny,
        }
    }
}

/// The tier that produced an outcome.
///
/// Variants are listed in precedence order; exactly one is attached to
/// every outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Allowlist,
    Denylist,
    Cache,
    Model,
    Error,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Allowlist => "allowlist",
            Source::Denylist => "denylist",
            Source::Cache => "cache",
            Source::Model => "model",
            Source::Error => "error",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome returned to the caller.
///
/// Constructed once per evaluation through the tier constructors below and
/// never mutated afterwards, so the fields are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(rename = "result")]
    is_positive: bool,
    confidence: f64,
    source: Source,
}

impl Outcome {
    /// Allow-list hit: benign with the fixed allow confidence.
    pub fn allowlisted() -> Self {
        Self {
            is_positive: false,
            confidence: ALLOWLIST_CONFIDENCE,
            source: Source::Allowlist,
        }
    }

    /// Deny-list hit: phishing with the fixed deny confidence.
    pub fn denylisted() -> Self {
        Self {
            is_positive: true,
            confidence: DENYLIST_CONFIDENCE,
            source: Source::Denylist,
        }
    }

    /// Replays a cached verdict.
    pub fn from_cache(verdict: &CachedVerdict) -> Self {
        Self {
            is_positive: verdict.is_positive,
            confidence: verdict.confidence,
            source: Source::Cache,
        }
    }

    /// Fresh classifier result.
    pub fn from_model(prediction: Prediction) -> Self {
        Self {
            is_positive: prediction.is_positive,
            confidence: prediction.confidence,
            source: Source::Model,
        }
    }

    /// Classifier unavailable, timed out, or the evaluation failed unexpectedly.
    pub fn error() -> Self {
        Self {
            is_positive: false,
            confidence: ERROR_CONFIDENCE,
            source: Source::Error,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.is_positive
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn is_error(&self) -> bool {
        self.source == Source::Error
    }
}

/// Classifier output for one URL
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub is_positive: bool,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(is_positive: bool, confidence: f64) -> Self {
        Self {
            is_positive,
            confidence,
        }
    }

    /// Builds a prediction from a phishing probability using `DECISION_THRESHOLD`.
    pub fn from_probability(probability: f64) -> Self {
        Self {
            is_positive: probability >= DECISION_THRESHOLD,
            confidence: probability,
        }
    }

    /// Clamps the confidence into `[MIN_MODEL_CONFIDENCE, 1.0]`.
    ///
    /// Returns `None` for a NaN confidence, which the cascade treats like an
    /// unavailable classifier.
    pub(crate) fn sanitized(self) -> Option<Self> {
        if self.confidence.is_nan() {
            return None;
        }
        Some(Self {
            is_positive: self.is_positive,
            confidence: self.confidence.clamp(MIN_MODEL_CONFIDENCE, 1.0),
        })
    }
}

/// A previously computed verdict held by the result cache.
///
/// Field names on the wire follow the cache payload used by existing
/// deployments (`is_phishing`, `confidence`, `last_updated`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedVerdict {
    #[serde(rename = "is_phishing")]
    pub is_positive: bool,
    pub confidence: f64,
    #[serde(rename = "last_updated")]
    pub observed_at: DateTime<Utc>,
}

impl CachedVerdict {
    pub fn new(is_positive: bool, confidence: f64) -> Self {
        Self {
            is_positive,
            confidence,
            observed_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Same clamping as `Prediction::sanitized`, for payloads written by
    /// other processes. `None` for a NaN confidence.
    pub(crate) fn sanitized(self) -> Option<Self> {
        let prediction = Prediction::new(self.is_positive, self.confidence).sanitized()?;
        Some(Self {
            confidence: prediction.confidence,
            ..self
        })
    }
}

impl From<Prediction> for CachedVerdict {
    fn from(prediction: Prediction) -> Self {
        Self::new(prediction.is_positive, prediction.confidence)
    }
}

/// Durable record of a classifier decision, upserted by URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub url: String,
    pub is_positive: bool,
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
    pub page_snapshot: Option<String>,
}

impl LedgerEntry {
    pub fn new(url: impl Into<String>, prediction: Prediction) -> Self {
        Self {
            url: url.into(),
            is_positive: prediction.is_positive,
            confidence: prediction.confidence,
            observed_at: Utc::now(),
            page_snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Option<String>) -> Self {
        self.page_snapshot = snapshot;
        self
    }
}
