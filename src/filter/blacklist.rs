//! Blacklist of ad/tracking domains.
//!
//! Domains are appended while the lists load, sorted once, then looked up by
//! binary search.

use std::borrow::Cow;
use std::sync::RwLock;

use crate::dns::canonical_domain;

#[derive(Default)]
struct Domains {
    list: Vec<String>,
    sorted: bool,
}

/// A sorted set of canonical (lowercase, dot-terminated) domains.
#[derive(Default)]
pub struct BlacklistCache {
    domains: RwLock<Domains>,
}

impl BlacklistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a domain. The cache is unsorted until the next [`sort`](Self::sort).
    pub fn add(&self, domain: &str) {
        self.extend(std::iter::once(domain.to_string()));
    }

    /// Append many domains under a single lock.
    pub fn extend<I: IntoIterator<Item = String>>(&self, domains: I) {
        let Ok(mut inner) = self.domains.write() else {
            return;
        };
        for domain in domains {
            let domain = match canonical(&domain) {
                Cow::Borrowed(_) => domain,
                Cow::Owned(owned) => owned,
            };
            inner.list.push(domain);
        }
        inner.sorted = false;
    }

    /// Sort and deduplicate. Lookups only succeed after this has run.
    pub fn sort(&self) {
        let Ok(mut inner) = self.domains.write() else {
            return;
        };
        inner.list.sort_unstable();
        inner.list.dedup();
        inner.sorted = true;
    }

    /// Check if a domain is blacklisted (exact match, case-insensitive).
    ///
    /// Always false while appends are pending a sort.
    pub fn contains(&self, domain: &str) -> bool {
        let Ok(inner) = self.domains.read() else {
            return false;
        };
        if !inner.sorted {
            return false;
        }
        let domain = canonical(domain);
        inner
            .list
            .binary_search_by(|probe| probe.as_str().cmp(domain.as_ref()))
            .is_ok()
    }

    pub fn is_sorted(&self) -> bool {
        self.domains.read().map(|d| d.sorted).unwrap_or(false)
    }

    /// Returns the number of domains in the blacklist.
    pub fn len(&self) -> usize {
        self.domains.read().map(|d| d.list.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Avoids allocating when the domain is already canonical.
fn canonical(domain: &str) -> Cow<'_, str> {
    let is_canonical = domain.ends_with('.')
        && !domain.bytes().any(|b| b.is_ascii_uppercase() || b.is_ascii_whitespace());
    if is_canonical {
        Cow::Borrowed(domain)
    } else {
        Cow::Owned(canonical_domain(domain))
    }
}
