//! Verdict list matching.
//!
//! `VerdictMatcher` answers "is this URL's domain on the allow or deny list"
//! against a `VerdictStore`, using exact-set membership first and compiled
//! domain patterns second.

mod pattern;
mod verdict;

pub use pattern::{match_pattern, DomainPattern, PatternCache};
pub use verdict::{VerdictMatcher, DEFAULT_PATTERN_CACHE_SIZE};
