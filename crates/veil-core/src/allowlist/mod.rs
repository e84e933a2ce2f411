//! Protected-resource allowlist matching.
//!
//! The matcher answers one question on the hot capture path: does this URL
//! point at a protected resource? Matching is hostname-only and
//! deliberately over-broad — known URL shorteners are treated as protected
//! because the matcher never follows redirects, and a false positive costs
//! one suppressed capture while a false negative can expose a crisis-site
//! visit.
//!
//! The matcher itself is pure and does no I/O. The daemon's refresh worker
//! pulls the feed through an [`AllowlistSource`] and swaps a new snapshot
//! into the shared [`AllowlistHandle`]; feed staleness and empty feeds are
//! raised as sealed-domain alarms by that worker, never family-side.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortener domains bundled as a floor under the external feed.
///
/// These stay protected even when the feed omits them.
const BUILTIN_SHORTENERS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "rebrand.ly",
];

/// Errors that can occur while loading the allowlist feed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AllowlistError {
    /// The feed could not be read.
    #[error("failed to read allowlist feed: {0}")]
    Io(#[from] std::io::Error),

    /// The feed payload could not be parsed.
    #[error("failed to parse allowlist feed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Category of a protected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    /// Crisis and suicide-prevention support.
    CrisisSupport,
    /// Domestic-violence support.
    DomesticViolence,
    /// Mental-health resources.
    MentalHealth,
    /// Child helplines.
    ChildHelpline,
    /// URL shortener, protected as an over-blocking margin.
    UrlShortener,
}

/// One entry in the protected-resource feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceEntry {
    /// Bare domain, e.g. `rainn.org`.
    pub domain: String,
    /// Resource category.
    pub category: ResourceCategory,
}

/// Source of the protected-resource feed.
///
/// Implementations pull from wherever the collaborator publishes the list;
/// staleness alarms are the refresh worker's responsibility.
pub trait AllowlistSource: Send + Sync {
    /// Fetches the current feed contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed cannot be read or parsed.
    fn fetch(&self) -> Result<Vec<ProtectedResourceEntry>, AllowlistError>;
}

/// File-backed feed source: a JSON array of `{domain, category}` objects.
pub struct FileAllowlistSource {
    path: PathBuf,
}

impl FileAllowlistSource {
    /// Creates a source reading from the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AllowlistSource for FileAllowlistSource {
    fn fetch(&self) -> Result<Vec<ProtectedResourceEntry>, AllowlistError> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Extracts and normalizes the hostname of a URL.
///
/// Ignores scheme, path, query, and fragment; strips userinfo, port, a
/// trailing dot, and one leading `www.`; lowercases. Returns `None` when
/// no plausible hostname remains.
#[must_use]
pub fn normalize_host(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Strip "scheme://" or a leading "//".
    let after_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed.strip_prefix("//").unwrap_or(trimmed),
    };

    // Authority ends at the first path, query, or fragment delimiter.
    let authority_end = after_scheme
        .find(['/', '?', '#'])
        .unwrap_or(after_scheme.len());
    let authority = &after_scheme[..authority_end];

    // Drop userinfo.
    let host_port = authority.rsplit('@').next().unwrap_or(authority);

    // Drop the port; bracketed IPv6 literals keep their brackets' content.
    let host = if let Some(rest) = host_port.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        host_port.split(':').next().unwrap_or(host_port)
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }

    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Immutable matcher over one feed snapshot.
#[derive(Debug, Clone, Default)]
pub struct AllowlistMatcher {
    domains: HashMap<String, ResourceCategory>,
}

impl AllowlistMatcher {
    /// Builds a matcher from feed entries plus the built-in shorteners.
    #[must_use]
    pub fn from_entries(entries: &[ProtectedResourceEntry]) -> Self {
        let mut domains = HashMap::with_capacity(entries.len() + BUILTIN_SHORTENERS.len());
        for shortener in BUILTIN_SHORTENERS {
            domains.insert((*shortener).to_string(), ResourceCategory::UrlShortener);
        }
        for entry in entries {
            if let Some(host) = normalize_host(&entry.domain) {
                domains.insert(host, entry.category);
            }
        }
        Self { domains }
    }

    /// A matcher with no feed entries at all, not even shorteners.
    ///
    /// Used to represent a fully unavailable feed; nothing matches.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the URL points at a protected resource.
    #[must_use]
    pub fn is_protected(&self, url: &str) -> bool {
        match normalize_host(url) {
            Some(host) => self.domains.contains_key(&host),
            None => false,
        }
    }

    /// Number of protected domains in this snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Whether the snapshot has no domains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Shared matcher snapshot, swapped whole by the refresh worker.
#[derive(Clone)]
pub struct AllowlistHandle {
    inner: Arc<RwLock<Snapshot>>,
}

struct Snapshot {
    matcher: AllowlistMatcher,
    fetched_at_ns: Option<u64>,
}

impl AllowlistHandle {
    /// Creates a handle with an initial matcher and no fetch timestamp.
    #[must_use]
    pub fn new(matcher: AllowlistMatcher) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Snapshot {
                matcher,
                fetched_at_ns: None,
            })),
        }
    }

    /// Replaces the snapshot after a successful feed pull.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    pub fn swap(&self, matcher: AllowlistMatcher, fetched_at_ns: u64) {
        let mut snapshot = self.inner.write().unwrap();
        snapshot.matcher = matcher;
        snapshot.fetched_at_ns = Some(fetched_at_ns);
    }

    /// Whether the URL points at a protected resource.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    #[must_use]
    pub fn is_protected(&self, url: &str) -> bool {
        self.inner.read().unwrap().matcher.is_protected(url)
    }

    /// When the snapshot was last refreshed, if ever.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    #[must_use]
    pub fn fetched_at_ns(&self) -> Option<u64> {
        self.inner.read().unwrap().fetched_at_ns
    }

    /// Whether the current snapshot has no domains.
    #[allow(clippy::missing_panics_doc)] // lock poisoning is unrecoverable
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.inner.read().unwrap().matcher.is_empty()
    }
}

impl Default for AllowlistHandle {
    fn default() -> Self {
        Self::new(AllowlistMatcher::from_entries(&[]))
    }
}
