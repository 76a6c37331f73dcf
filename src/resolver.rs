//! Best-effort external link resolution for paper titles.
//!
//! Resolution never fails and never blocks the search path: a miss from
//! the external lookup falls back to a generic scholar-search URL. Results
//! are kept in an explicit fixed-capacity LRU cache owned by the resolver
//! (no ambient memoization).

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Default number of cached resolutions.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Where a resolved link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    Arxiv,
    Fallback,
}

impl std::fmt::Display for LinkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkSource::Arxiv => write!(f, "arxiv"),
            LinkSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A resolved external link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub url: String,
    pub source: LinkSource,
}

/// Seam for the external title lookup. Implementations may scrape or call
/// an API; returning `None` means "not resolvable", never an error.
pub trait TitleLookup: Send + Sync {
    fn lookup(&self, title: &str) -> Option<String>;
}

/// Lookup that resolves nothing; every title takes the fallback URL.
#[derive(Debug, Default)]
pub struct NoLookup;

impl TitleLookup for NoLookup {
    fn lookup(&self, _title: &str) -> Option<String> {
        None
    }
}

/// Title -> URL resolver with a bounded LRU cache keyed by title.
pub struct LinkResolver {
    lookup: Box<dyn TitleLookup>,
    cache: Mutex<LruCache<String, Resolution>>,
}

impl LinkResolver {
    pub fn new(lookup: Box<dyn TitleLookup>, capacity: usize) -> Self {
        Self {
            lookup,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Resolver with no external lookup: cheap, offline, fallback-only.
    pub fn offline() -> Self {
        Self::new(Box::new(NoLookup), DEFAULT_CACHE_CAPACITY)
    }

    /// Resolve a title to an external link. Cached, infallible.
    pub fn resolve(&self, title: &str) -> Resolution {
        if let Ok(mut cache) = self.cache.lock()
            && let Some(hit) = cache.get(title)
        {
            return hit.clone();
        }

        let resolution = match self.lookup.lookup(title) {
            Some(url) => Resolution {
                url,
                source: LinkSource::Arxiv,
            },
            None => Resolution {
                url: fallback_url(title),
                source: LinkSource::Fallback,
            },
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(title.to_string(), resolution.clone());
        }
        resolution
    }
}

/// Generic search URL used when the external lookup cannot resolve a
/// title.
pub fn fallback_url(title: &str) -> String {
    format!(
        "https://scholar.google.com/scholar?q={}",
        urlencoding::encode(title)
    )
}
