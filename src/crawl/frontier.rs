//! Visited/pending bookkeeping for breadth-first crawls.
//!
//! The only way a URL becomes "to fetch" is through an atomic claim, which
//! moves it into the visited set under the same lock that checked it. Two
//! workers that discover the same URL can therefore never both fetch it.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct FrontierState {
    visited: HashSet<String>,
    pending: BTreeSet<String>,
}

/// Concurrency-safe crawl frontier.
///
/// Invariants: visited and pending are disjoint; a URL enters visited at most
/// once for the lifetime of the frontier.
///
/// Outside this crate URLs become "to fetch" only through [`Frontier::claim`]:
///
/// ```
/// use sitewatch_core::crawl::Frontier;
///
/// let frontier = Frontier::with_seed("https://ex.com/");
/// let claimed = frontier.claim(["https://ex.com/a".to_string()]);
/// assert_eq!(claimed.len(), 1);
/// assert!(frontier.is_visited("https://ex.com/a"));
/// ```
///
/// ```compile_fail
/// use sitewatch_core::crawl::Frontier;
///
/// let frontier = Frontier::new();
/// frontier.enqueue(["https://ex.com/".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
}

impl Frontier {
    /// Creates an empty frontier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frontier whose only pending URL is `seed`.
    #[must_use]
    pub fn with_seed(seed: impl Into<String>) -> Self {
        let frontier = Self::new();
        frontier.enqueue([seed.into()]);
        frontier
    }

    /// Atomically claims every URL in `urls` not yet visited.
    ///
    /// Claimed URLs are marked visited and removed from pending. The returned
    /// set is the authoritative list of URLs to fetch; claiming URLs that are
    /// all visited returns an empty set.
    pub fn claim<I>(&self, urls: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = self.lock();
        let mut claimed = BTreeSet::new();
        for url in urls {
            if state.visited.insert(url.clone()) {
                state.pending.remove(&url);
                claimed.insert(url);
            }
        }
        claimed
    }

    /// Adds unvisited URLs to pending without claiming them.
    pub(crate) fn enqueue<I>(&self, urls: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = self.lock();
        for url in urls {
            if !state.visited.contains(&url) {
                state.pending.insert(url);
            }
        }
    }

    /// Atomically claims everything pending.
    pub(crate) fn claim_pending(&self) -> BTreeSet<String> {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        for url in &pending {
            state.visited.insert(url.clone());
        }
        pending
    }

    /// Whether `url` has been claimed.
    #[must_use]
    pub fn is_visited(&self, url: &str) -> bool {
        self.lock().visited.contains(url)
    }

    /// Number of claimed URLs.
    #[must_use]
    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    /// Number of URLs waiting to be claimed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Every claimed URL, sorted.
    #[must_use]
    pub fn visited_sorted(&self) -> Vec<String> {
        let mut visited: Vec<String> = self.lock().visited.iter().cloned().collect();
        visited.sort();
        visited
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
