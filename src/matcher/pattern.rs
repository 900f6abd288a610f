use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;

use crate::error::Result;

/// Compiled domain pattern
#[derive(Debug, Clone)]
pub enum DomainPattern {
    /// `*.example.com`: matches "example.com" and any subdomain of it.
    /// Stores (suffix, dot_suffix) where dot_suffix = ".{suffix}" pre-computed.
    Suffix(String, String),
    /// Any other pattern: shell-glob semantics over the whole domain
    /// (`*` any run, `?` one character, `[...]` / `[!...]` character classes).
    Glob(Regex),
}

impl DomainPattern {
    /// Compile a pattern. Patterns are lowercased, like the domains they are matched against.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim().to_lowercase();

        if let Some(suffix) = pattern.strip_prefix("*.") {
            let dot_suffix = format!(".{}", suffix);
            return Ok(DomainPattern::Suffix(suffix.to_string(), dot_suffix));
        }

        Ok(DomainPattern::Glob(Regex::new(&glob_to_regex(&pattern))?))
    }

    /// Check if the domain matches this pattern.
    /// Assumes `domain` is already lowercased (as produced by the domain normalizer).
    pub fn matches(&self, domain: &str) -> bool {
        match self {
            DomainPattern::Suffix(suffix, dot_suffix) => {
                domain == suffix || domain.ends_with(dot_suffix.as_str())
            }
            DomainPattern::Glob(re) => re.is_match(domain),
        }
    }
}

/// Match a domain against an uncompiled pattern.
///
/// Invalid patterns never match.
pub fn match_pattern(domain: &str, pattern: &str) -> bool {
    DomainPattern::new(pattern)
        .map(|p| p.matches(domain))
        .unwrap_or(false)
}

/// Translate a shell glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                // Collapse runs of '*'
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&translate_class(&chars[i + 1..end]));
                    i = end;
                }
                // Unterminated class is a literal '['
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `start`, if any.
/// A `]` directly after `[` or `[!` is a literal member.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if j < chars.len() && chars[j] == '!' {
        j += 1;
    }
    if j < chars.len() && chars[j] == ']' {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

fn translate_class(body: &[char]) -> String {
    let mut out = String::from("[");
    let mut body = body;
    if let Some(('!', rest)) = body.split_first() {
        out.push('^');
        body = rest;
    }
    for &c in body {
        match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(']');
    out
}

/// LRU cache of compiled patterns, keyed by the pattern text.
///
/// Pattern sets are re-fetched from the verdict store on every check, so
/// compilation is memoized here rather than repeated per domain.
pub struct PatternCache {
    compiled: Mutex<LruCache<String, Option<Arc<DomainPattern>>>>,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            compiled: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get the compiled form of `pattern`, compiling on miss.
    /// Returns `None` for patterns that fail to compile.
    pub fn get(&self, pattern: &str) -> Option<Arc<DomainPattern>> {
        if let Some(cached) = self.compiled.lock().get(pattern) {
            return cached.clone();
        }

        // Compile outside the lock; a racing compile of the same pattern is harmless.
        let compiled = match DomainPattern::new(pattern) {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "ignoring invalid domain pattern");
                None
            }
        };

        self.compiled
            .lock()
            .put(pattern.to_string(), compiled.clone());
        compiled
    }

    pub fn len(&self) -> usize {
        self.compiled.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.lock().is_empty()
    }

    pub fn clear(&self) {
        self.compiled.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_pattern() {
        assert!(match_pattern("a.example.com", "*.example.com"));
        assert!(match_pattern("example.com", "*.example.com"));
        assert!(match_pattern("x.y.example.com", "*.example.com"));
        assert!(!match_pattern("notexample.com", "*.example.com"));
        assert!(!match_pattern("example.org", "*.example.com"));
    }

    #[test]
    fn test_glob_star() {
        assert!(match_pattern("suspicious-site.com", "suspicious-*"));
        assert!(!match_pattern("normal-site.com", "suspicious-*"));
        assert!(match_pattern("paypal-login.com", "*paypal*"));
        assert!(match_pattern("google.co", "google.*"));
    }

    #[test]
    fn test_glob_question_mark() {
        assert!(match_pattern("g00gle.com", "g??gle.com"));
        assert!(!match_pattern("gogle.com", "g??gle.com"));
    }

    #[test]
    fn test_glob_is_anchored() {
        assert!(match_pattern("example.com", "example.com"));
        assert!(!match_pattern("myexample.com", "example.com"));
        assert!(!match_pattern("example.com.evil", "example.com"));
    }

    #[test]
    fn test_glob_dot_is_literal() {
        assert!(!match_pattern("exampleXcom", "example.com"));
    }

    #[test]
    fn test_glob_character_class() {
        assert!(match_pattern("bank1.com", "bank[0-9].com"));
        assert!(!match_pattern("bankx.com", "bank[0-9].com"));
        assert!(match_pattern("bankx.com", "bank[!0-9].com"));
        assert!(!match_pattern("bank1.com", "bank[!0-9].com"));
    }

    #[test]
    fn test_glob_unterminated_class_is_literal() {
        assert!(match_pattern("a[b.com", "a[b.com"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(!match_pattern("b.com", "[z-a].com"));
    }

    #[test]
    fn test_pattern_lowercased() {
        assert!(match_pattern("mail.google.com", "*.GOOGLE.com"));
    }

    #[test]
    fn test_pattern_cache_memoizes() {
        let cache = PatternCache::new(2);
        let first = cache.get("*.example.com").unwrap();
        let second = cache.get("*.example.com").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.get("a*");
        cache.get("b*");
        assert_eq!(cache.len(), 2);

        assert!(cache.get("[z-a]").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
