//! `sitewatch crawl`: discover a domain's pages and export the list.

use std::sync::Arc;

use anyhow::Result;
use sitewatch_core::crawl::CrawlError;
use sitewatch_core::fetch::CONNECT_TIMEOUT_SECS;
use sitewatch_core::{
    ConcurrentCrawler, CrawlConfig, CsvExporter, ExportId, Exporter, HttpClient, RunContext,
};
use tracing::{error, warn};

use crate::ProcessExit;
use crate::app::progress;
use crate::app::settings::CrawlSettings;

pub(crate) async fn run_crawl(
    settings: CrawlSettings,
    ctx: RunContext,
    use_spinner: bool,
    quiet: bool,
) -> Result<ProcessExit> {
    let fetcher = Arc::new(HttpClient::with_timeouts(
        CONNECT_TIMEOUT_SECS,
        settings.timeout_secs,
    ));
    let crawler = ConcurrentCrawler::new(
        fetcher,
        CrawlConfig {
            max_workers: settings.workers,
        },
    )?;

    let (handle, stop) =
        progress::spawn_progress_ui(use_spinner, Arc::clone(ctx.progress()), "Crawling");
    let result = crawler
        .run(&ctx, &settings.start_url, settings.domain.as_deref())
        .await;
    progress::stop_progress_ui(handle, &stop).await;

    let result = match result {
        Ok(result) => result,
        Err(CrawlError::Interrupted { rounds, visited }) => {
            warn!(rounds, visited = visited.len(), "crawl interrupted, nothing exported");
            return Ok(ProcessExit::Failure);
        }
        Err(e) => return Err(e.into()),
    };

    if result.failed == result.visited.len() {
        error!(
            failed = result.failed,
            start_url = %settings.start_url,
            "no page could be fetched, nothing exported"
        );
        return Ok(ProcessExit::Failure);
    }

    let exporter = CsvExporter::new(&settings.export_dir);
    let path = exporter.export(&ExportId::now(&result.domain), &result.visited)?;

    if !quiet {
        println!(
            "Visited {} URL(s) in {} round(s), {} failed",
            result.visited.len(),
            result.rounds,
            result.failed
        );
        println!("Saved to {}", path.display());
    }

    Ok(ProcessExit::Success)
}
