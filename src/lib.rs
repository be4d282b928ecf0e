//! Sitewatch Core Library
//!
//! Periodically captures the text of a set of web pages, keeps a short
//! rolling history of captures, and reports what changed between the two most
//! recent ones. A separate crawler discovers every reachable page of a domain.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Single-shot bounded-timeout page fetching and retry policy
//! - [`extract`] - Page title and paragraph text, link discovery
//! - [`snapshot`] - Durable snapshot store with atomic commit and retention
//! - [`diff`] - Line-level comparison of two snapshots
//! - [`pipeline`] - One change detection run, start to finish
//! - [`crawl`] - Concurrent same-domain crawler and result export
//! - [`targets`] - Loading monitored URLs from a file
//! - [`context`] - Interrupt flag and progress counters shared with the caller

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod crawl;
pub mod diff;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod snapshot;
pub mod targets;
mod user_agent;

// Re-export commonly used types
pub use context::{RunContext, RunProgress};
pub use crawl::{ConcurrentCrawler, CrawlConfig, CrawlResult, CsvExporter, ExportId, Exporter};
pub use diff::{DiffKind, DiffRecord, Differ};
pub use fetch::{FetchError, HttpClient, PageFetcher, RetryPolicy};
pub use pipeline::{
    ChangeDetectionPipeline, ChangeReport, DEFAULT_CONCURRENCY, JsonFileNotifier, LogNotifier,
    Notifier, PipelineConfig, PipelineError, RunOutcome,
};
pub use snapshot::{ArchiveName, DEFAULT_RETENTION, SnapshotStore};
pub use targets::{archive_name_for, load_targets};
