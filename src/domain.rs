//! Domain normalizer.
//!
//! Reduces an arbitrary URL string to its registrable domain (`label.suffix`),
//! lowercased and IDNA-encoded. Pure and deterministic; no I/O.
//!
//! Only ICANN suffixes count: privately registered suffixes such as
//! `github.io` or `blogspot.com` are themselves registrable domains.

use url::{Host, Url};

/// Schemes whose hosts get IDNA processing from the URL parser.
const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "ws", "wss", "ftp"];

/// A lowercase, IDNA-encoded registrable domain (e.g. `google.com`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(String);

impl Domain {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the registrable domain from a URL, with or without scheme.
///
/// Returns `None` for anything that has no host, an IP literal host, an
/// invalid IDNA label, or a host without a known public suffix.
pub fn extract(url: &str) -> Option<Domain> {
    let host = extract_host(url)?;
    registrable_domain(&host)
}

/// Parse the host component, lowercased, IDNA-encoded and without trailing dots.
fn extract_host(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    // Scheme-less input is parsed as http so the extracted host does not
    // depend on whether a scheme was given.
    let parsed = if url.contains("://") || has_scheme_prefix(url) {
        Url::parse(url).ok()?
    } else {
        Url::parse(&format!("http://{}", url)).ok()?
    };

    if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
        return None;
    }

    match parsed.host()? {
        Host::Domain(host) => {
            let host = host.trim_end_matches('.').to_lowercase();
            if host.is_empty() {
                None
            } else {
                Some(host)
            }
        }
        Host::Ipv4(_) | Host::Ipv6(_) => None,
    }
}

/// True for `scheme:rest` input such as `mailto:a@b.com`, but not for a
/// bare `host:port`.
fn has_scheme_prefix(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once(':') else {
        return false;
    };
    let is_scheme = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    let is_port = rest
        .split(['/', '?', '#'])
        .next()
        .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));
    is_scheme && !is_port
}

/// Split off subdomains using the ICANN section of the public suffix list.
fn registrable_domain(host: &str) -> Option<Domain> {
    let suffix = icann_suffix(host)?;
    let rest = host.strip_suffix(suffix)?.strip_suffix('.')?;
    let label = rest.rsplit('.').next()?;
    if label.is_empty() {
        return None;
    }
    Some(Domain(format!("{}.{}", label, suffix)))
}

/// Longest ICANN public suffix of `host`, skipping private suffixes.
fn icann_suffix(host: &str) -> Option<&str> {
    let mut candidate = host;
    loop {
        let suffix = psl::suffix(candidate.as_bytes())?;
        if !suffix.is_known() {
            return None;
        }
        // Hosts are IDNA-encoded ASCII, so byte offsets are char boundaries
        let found = &candidate[candidate.len() - suffix.as_bytes().len()..];
        match suffix.typ() {
            Some(psl::Type::Private) => {
                let (_, parent) = found.split_once('.')?;
                candidate = parent;
            }
            _ => return Some(found),
        }
    }
}
