use thiserror::Error;

/// Classifies collaborator (store, cache, ledger) errors for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Backend unreachable or refused the operation
    Unavailable,
    /// Operation timed out
    Timeout,
    /// Stored payload could not be decoded
    InvalidData,
}

/// Cascade error types
///
/// These never cross the `evaluate` boundary: the cascade resolves every
/// error into a defined `Outcome`. They exist for collaborator
/// implementations and for the list/config loaders.
#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Parse error at line {line}: {message}")]
    ParseAtLine { line: usize, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {message}")]
    Store {
        kind: StoreErrorKind,
        message: String,
    },

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl CascadeError {
    /// Shorthand for a store error of the given kind.
    pub fn store(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        CascadeError::Store {
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CascadeError>;
