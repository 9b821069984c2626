//! Which links of a site are still worth visiting.

use anyhow::{anyhow, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use url::Url;

fn bare_host(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Visited paths of one site crawl. Shared by every crawl task of the site.
pub struct LinkManager {
    base_host: String,
    visited: Mutex<HashSet<String>>,
}

/// Exclusive view over the visited set, held while a batch of links is
/// checked and marked.
pub struct Links<'a> {
    base_host: &'a str,
    visited: MutexGuard<'a, HashSet<String>>,
}

impl LinkManager {
    pub fn new(root: &str) -> Result<Self> {
        let url = Url::parse(root)?;
        let host = url.host_str().ok_or_else(|| anyhow!("site url {root} has no host"))?;
        let mut visited = HashSet::new();
        visited.insert(url.path().to_string());
        tracing::debug!(host, "link manager created");
        Ok(Self { base_host: bare_host(host).to_string(), visited: Mutex::new(visited) })
    }

    pub fn base_host(&self) -> &str {
        &self.base_host
    }

    pub fn lock(&self) -> Links<'_> {
        Links { base_host: &self.base_host, visited: self.visited.lock() }
    }

    /// Filters `urls` and marks the survivors visited under one lock, so two
    /// sibling tasks never claim the same path.
    pub fn claim(&self, urls: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut links = self.lock();
        let fresh = links.filter(urls);
        links.add(&fresh);
        fresh
    }

    /// Host match only; the visited set is not consulted.
    pub fn in_scope(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| bare_host(h) == self.base_host))
            .unwrap_or(false)
    }
}

impl Links<'_> {
    /// An unvisited http(s) link of the site without a fragment.
    pub fn check(&self, url: &str) -> bool {
        if url.contains('#') {
            return false;
        }
        let Ok(parsed) = Url::parse(url) else { return false };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        match parsed.host_str() {
            Some(host) => bare_host(host) == self.base_host && !self.visited.contains(parsed.path()),
            None => false,
        }
    }

    pub fn add(&mut self, urls: &[String]) {
        for url in urls {
            if let Ok(parsed) = Url::parse(url) {
                self.visited.insert(parsed.path().to_string());
            }
        }
    }

    /// Links passing [`Links::check`], at most one per path.
    pub fn filter(&self, urls: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut paths = HashSet::new();
        urls.into_iter()
            .filter(|url| self.check(url))
            .filter(|url| Url::parse(url).map(|u| paths.insert(u.path().to_string())).unwrap_or(false))
            .collect()
    }
}
