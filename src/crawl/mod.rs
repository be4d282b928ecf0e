//! Same-domain breadth-first crawling.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitewatch_core::context::RunContext;
//! use sitewatch_core::crawl::{ConcurrentCrawler, CrawlConfig, CsvExporter, ExportId, Exporter};
//! use sitewatch_core::fetch::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let crawler = ConcurrentCrawler::new(Arc::new(HttpClient::new()), CrawlConfig::default())?;
//! let result = crawler.run(&RunContext::new(), "https://example.com/", None).await?;
//!
//! let path = CsvExporter::new(".").export(&ExportId::now(&result.domain), &result.visited)?;
//! println!("{} URLs saved to {}", result.visited.len(), path.display());
//! # Ok(())
//! # }
//! ```

mod crawler;
mod export;
mod filter;
mod frontier;

pub use crawler::{ConcurrentCrawler, CrawlConfig, CrawlError, CrawlResult, DEFAULT_WORKERS};
pub use export::{CsvExporter, ExportError, ExportId, Exporter};
pub use filter::{EXCLUDED_EXTENSIONS, LinkFilter, authority};
pub use frontier::Frontier;
