//! Round-based concurrent crawler.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::filter::{LinkFilter, authority};
use super::frontier::Frontier;
use crate::context::{RunContext, RunProgress};
use crate::extract::extract_links;
use crate::fetch::PageFetcher;

/// Minimum allowed worker count.
const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
const MAX_WORKERS: usize = 100;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 10;

/// Errors that end a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The start URL is not an absolute http(s) URL with a host.
    #[error("invalid start URL: {url}")]
    InvalidStartUrl {
        /// The rejected URL.
        url: String,
    },

    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkers {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The caller interrupted the crawl between rounds.
    #[error("crawl interrupted after {rounds} rounds ({} URLs visited)", .visited.len())]
    Interrupted {
        /// Completed rounds.
        rounds: usize,
        /// URLs visited so far, sorted.
        visited: Vec<String>,
    },
}

/// Tunables for [`ConcurrentCrawler`].
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum parallel fetches per round (1-100).
    pub max_workers: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_WORKERS,
        }
    }
}

/// Result of a finished crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlResult {
    /// Domain links were filtered against.
    pub domain: String,
    /// Every visited URL, sorted. Includes URLs whose fetch failed.
    pub visited: Vec<String>,
    /// Rounds executed.
    pub rounds: usize,
    /// URLs that could not be fetched.
    pub failed: usize,
}

/// Breadth-first crawler with bounded parallelism inside each round.
///
/// Rounds are strictly sequential: every URL claimed for round *k* is fetched
/// before round *k+1* is claimed. Links discovered during a round are pooled
/// and claimed once, so a URL found by several pages is fetched once.
///
/// A failed page contributes no links but stays visited. The crawler never
/// retries.
pub struct ConcurrentCrawler {
    fetcher: Arc<dyn PageFetcher>,
    config: CrawlConfig,
}

impl std::fmt::Debug for ConcurrentCrawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentCrawler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct PageOutcome {
    links: Vec<String>,
    failed: bool,
}

impl ConcurrentCrawler {
    /// Creates a crawler.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidWorkers`] if `max_workers` is outside 1-100.
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: CrawlConfig) -> Result<Self, CrawlError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&config.max_workers) {
            return Err(CrawlError::InvalidWorkers {
                value: config.max_workers,
            });
        }
        Ok(Self { fetcher, config })
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawls from `start_url`, following links whose authority ends with
    /// `base_domain` (default: the start URL's `host[:port]`).
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidStartUrl`] for a start URL that is not
    /// http(s) with a host, or [`CrawlError::Interrupted`] if `ctx` is
    /// interrupted before a round starts.
    #[instrument(skip(self, ctx), fields(workers = self.config.max_workers))]
    pub async fn run(
        &self,
        ctx: &RunContext,
        start_url: &str,
        base_domain: Option<&str>,
    ) -> Result<CrawlResult, CrawlError> {
        let invalid = || CrawlError::InvalidStartUrl {
            url: start_url.to_string(),
        };
        let start = Url::parse(start_url.trim()).map_err(|_| invalid())?;
        if !matches!(start.scheme(), "http" | "https") {
            return Err(invalid());
        }
        let start_authority = authority(&start).ok_or_else(invalid)?;
        let filter = LinkFilter::new(base_domain.unwrap_or(&start_authority));

        info!(start = %start, domain = filter.domain(), "starting crawl");

        let frontier = Frontier::with_seed(start.to_string());
        let progress = ctx.progress();
        progress.reset();

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut claimed = frontier.claim_pending();
        let mut rounds = 0;
        let mut failed = 0;

        while !claimed.is_empty() {
            if ctx.is_interrupted() {
                warn!(rounds, visited = frontier.visited_count(), "crawl interrupted");
                return Err(CrawlError::Interrupted {
                    rounds,
                    visited: frontier.visited_sorted(),
                });
            }

            rounds += 1;
            debug!(round = rounds, urls = claimed.len(), "starting round");
            progress.add_total(claimed.len());

            let (discovered, round_failed) =
                self.fetch_round(claimed, &filter, &semaphore, progress).await;
            failed += round_failed;

            claimed = frontier.claim(discovered);
            debug!(
                round = rounds,
                next = claimed.len(),
                visited = frontier.visited_count(),
                "round complete"
            );
        }

        let visited = frontier.visited_sorted();
        info!(visited = visited.len(), rounds, failed, "crawl complete");
        Ok(CrawlResult {
            domain: filter.domain().to_string(),
            visited,
            rounds,
            failed,
        })
    }

    /// Fetches every URL of one round and returns the union of accepted links.
    ///
    /// Waits for every task before returning.
    async fn fetch_round(
        &self,
        urls: BTreeSet<String>,
        filter: &LinkFilter,
        semaphore: &Arc<Semaphore>,
        progress: &Arc<RunProgress>,
    ) -> (BTreeSet<String>, usize) {
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let semaphore = Arc::clone(semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let filter = filter.clone();
            let progress = Arc::clone(progress);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    progress.record_failure();
                    return PageOutcome {
                        links: Vec::new(),
                        failed: true,
                    };
                };
                let outcome = process_page(fetcher.as_ref(), &url, &filter).await;
                if outcome.failed {
                    progress.record_failure();
                } else {
                    progress.record_success();
                }
                outcome
            }));
        }

        let mut discovered = BTreeSet::new();
        let mut failed = 0;
        for handle in handles {
            match handle.await {
                Ok(outcome) => {
                    if outcome.failed {
                        failed += 1;
                    }
                    discovered.extend(outcome.links);
                }
                Err(e) => {
                    warn!(error = %e, "crawl task panicked");
                    failed += 1;
                }
            }
        }
        (discovered, failed)
    }
}

/// Fetches one page and returns its accepted links.
async fn process_page(fetcher: &dyn PageFetcher, url: &str, filter: &LinkFilter) -> PageOutcome {
    let page = match fetcher.fetch(url).await {
        Ok(page) if page.is_success() => page,
        Ok(page) => {
            debug!(url, status = page.status, "page not followed");
            return PageOutcome {
                links: Vec::new(),
                failed: true,
            };
        }
        Err(e) => {
            debug!(url, error = %e, "page fetch failed");
            return PageOutcome {
                links: Vec::new(),
                failed: true,
            };
        }
    };

    let base = Url::parse(&page.final_url)
        .or_else(|_| Url::parse(url))
        .ok();
    let links = base
        .map(|base| {
            extract_links(&base, &page.body)
                .into_iter()
                .filter(|link| filter.accepts(link))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    PageOutcome {
        links,
        failed: false,
    }
}
