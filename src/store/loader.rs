//! Verdict list files.
//!
//! One entry per line, `#` starts a comment. Entries containing `*`, `?` or
//! `[` are patterns; everything else is reduced to its registrable domain and
//! goes to the exact set. `file: <path>` includes another list; relative
//! paths resolve against the directory of the including file.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::memory::MemoryVerdictStore;
use crate::domain;
use crate::error::{CascadeError, Result};
use crate::matcher::DomainPattern;
use crate::types::Partition;

/// Characters allowed in a pattern entry (lowercased, unicode labels allowed)
static PATTERN_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{L}\p{N}*?\[\]!._\-]+$")
        .expect("PATTERN_CHARSET: hardcoded regex is invalid")
});

/// Maximum nesting depth for `file:` include directives.
const MAX_INCLUDE_DEPTH: usize = 10;

/// Contents of one verdict list partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerdictList {
    /// Registrable domains, exact match
    pub domains: HashSet<String>,
    /// Glob patterns, ordered for deterministic iteration
    pub patterns: BTreeSet<String>,
}

impl VerdictList {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.patterns.is_empty()
    }

    fn merge(&mut self, other: VerdictList) {
        self.domains.extend(other.domains);
        self.patterns.extend(other.patterns);
    }
}

/// Parse a verdict list from text.
///
/// Relative `file:` includes resolve against the working directory.
pub fn parse_verdict_list(text: &str) -> Result<VerdictList> {
    parse_inner(text, None, 0)
}

/// Parse a verdict list from a file.
pub fn parse_verdict_list_file(path: impl AsRef<Path>) -> Result<VerdictList> {
    parse_file_inner(path, 0)
}

/// Load both partitions from files into a new in-memory store.
pub fn load_verdict_lists(
    allow_path: impl AsRef<Path>,
    deny_path: impl AsRef<Path>,
) -> Result<MemoryVerdictStore> {
    let allow = parse_verdict_list_file(allow_path)?;
    let deny = parse_verdict_list_file(deny_path)?;

    tracing::info!(
        allow_domains = allow.domains.len(),
        allow_patterns = allow.patterns.len(),
        deny_domains = deny.domains.len(),
        deny_patterns = deny.patterns.len(),
        "loaded verdict lists"
    );

    let store = MemoryVerdictStore::new();
    store.replace(Partition::Allow, allow);
    store.replace(Partition::Deny, deny);
    Ok(store)
}

fn parse_file_inner(path: impl AsRef<Path>, depth: usize) -> Result<VerdictList> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        CascadeError::Parse(format!(
            "Failed to read verdict list '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_inner(&text, path.parent(), depth)
}

fn parse_inner(text: &str, base: Option<&Path>, depth: usize) -> Result<VerdictList> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(CascadeError::Parse(format!(
            "file include depth exceeds maximum ({MAX_INCLUDE_DEPTH}), possible circular include"
        )));
    }

    let mut list = VerdictList::default();

    for (line_num, line) in text.lines().enumerate() {
        let line_num = line_num + 1;

        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(path) = line.strip_prefix("file:") {
            let path = Path::new(path.trim());
            let path = match base {
                Some(base) => base.join(path),
                None => path.to_path_buf(),
            };
            list.merge(parse_file_inner(path, depth + 1)?);
            continue;
        }

        let entry = line.to_lowercase();
        if is_pattern(&entry) {
            if !PATTERN_CHARSET.is_match(&entry) {
                return Err(CascadeError::ParseAtLine {
                    line: line_num,
                    message: format!("Invalid characters in pattern: {}", line),
                });
            }
            DomainPattern::new(&entry).map_err(|e| CascadeError::ParseAtLine {
                line: line_num,
                message: format!("Invalid pattern {}: {}", line, e),
            })?;
            list.patterns.insert(entry);
        } else {
            let domain = domain::extract(&entry).ok_or_else(|| CascadeError::ParseAtLine {
                line: line_num,
                message: format!("Not a registrable domain: {}", line),
            })?;
            list.domains.insert(domain.into_string());
        }
    }

    Ok(list)
}

/// URLs may carry `?` or `[` in their path or query, so they never count.
fn is_pattern(entry: &str) -> bool {
    !entry.contains('/') && entry.contains(['*', '?', '['])
}
