//! `sitewatch watch`: one or more change detection runs over a target file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sitewatch_core::fetch::CONNECT_TIMEOUT_SECS;
use sitewatch_core::pipeline::NotifyError;
use sitewatch_core::snapshot::ArchiveName;
use sitewatch_core::{
    ChangeDetectionPipeline, ChangeReport, HttpClient, JsonFileNotifier, Notifier, PipelineConfig,
    PipelineError, RetryPolicy, RunContext, RunOutcome, SnapshotStore, archive_name_for,
    load_targets,
};
use tracing::{error, info, warn};

use crate::ProcessExit;
use crate::app::settings::WatchSettings;
use crate::app::{exit_handler, progress};

const INTERRUPT_POLL: Duration = Duration::from_millis(200);

/// Prints every report to stdout and optionally saves it as JSON.
#[derive(Debug, Clone)]
pub(crate) struct ConsoleNotifier {
    json: Option<JsonFileNotifier>,
}

impl ConsoleNotifier {
    pub(crate) fn new(report_dir: Option<PathBuf>) -> Self {
        Self {
            json: report_dir.map(JsonFileNotifier::new),
        }
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, subject: &str, report: &ChangeReport) -> Result<(), NotifyError> {
        println!("{subject}");
        print!("{}", report.render_text());
        if let Some(json) = &self.json {
            json.notify(subject, report).await?;
            info!(path = %json.report_path(&report.latest).display(), "report saved");
        }
        Ok(())
    }
}

/// Runs `watch` until done, or until interrupted in interval mode.
pub(crate) async fn run_watch(
    settings: WatchSettings,
    ctx: RunContext,
    use_spinner: bool,
    quiet: bool,
) -> Result<ProcessExit> {
    let targets = load_targets(&settings.targets_file)
        .with_context(|| format!("Cannot load targets from '{}'", settings.targets_file.display()))?;
    let archive = archive_name_for(&targets)?;
    info!(targets = targets.len(), archive = %archive, "targets loaded");

    let store = SnapshotStore::new(&settings.archive_root, settings.retention)?;
    let fetcher = Arc::new(HttpClient::with_timeouts(
        CONNECT_TIMEOUT_SECS,
        settings.timeout_secs,
    ));
    let notifier = Arc::new(ConsoleNotifier::new(settings.report_dir.clone()));
    let config = PipelineConfig {
        concurrency: settings.concurrency,
        retry_policy: RetryPolicy::with_max_attempts(settings.max_retries),
    };
    let pipeline = ChangeDetectionPipeline::new(store, fetcher, notifier, config)?;

    let Some(interval_secs) = settings.interval_secs else {
        return run_cycle(&pipeline, &ctx, &archive, &targets, use_spinner, quiet).await;
    };

    let interval = Duration::from_secs(interval_secs);
    info!(interval_secs, "watching until interrupted");
    loop {
        if let Err(e) = run_cycle(&pipeline, &ctx, &archive, &targets, use_spinner, quiet).await {
            let message = format!("{e:#}");
            error!(error = %message, "run failed, retrying next interval");
        }
        if !sleep_unless_interrupted(&ctx, interval).await {
            info!("interrupted, stopping watch");
            return Ok(ProcessExit::Success);
        }
    }
}

async fn run_cycle(
    pipeline: &ChangeDetectionPipeline,
    ctx: &RunContext,
    archive: &ArchiveName,
    targets: &[String],
    use_spinner: bool,
    quiet: bool,
) -> Result<ProcessExit> {
    let (handle, stop) =
        progress::spawn_progress_ui(use_spinner, Arc::clone(ctx.progress()), "Fetching pages");
    let result = pipeline.run_once(ctx, archive, targets).await;
    progress::stop_progress_ui(handle, &stop).await;

    match result {
        Ok(outcome) => {
            if !quiet {
                print_summary(&outcome);
            }
            Ok(exit_handler::determine_exit_outcome(
                outcome.captured,
                outcome.failures.len(),
            ))
        }
        Err(PipelineError::Interrupted { stage }) => {
            warn!(%stage, "run interrupted, no snapshot committed");
            Ok(ProcessExit::Failure)
        }
        Err(e @ PipelineError::NothingCaptured { .. }) => {
            error!(error = %e, "no snapshot committed");
            Ok(ProcessExit::Failure)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_summary(outcome: &RunOutcome) {
    println!(
        "Snapshot {} saved to archive {}: {} page(s) captured, {} failed",
        outcome.snapshot,
        outcome.archive,
        outcome.captured,
        outcome.failures.len()
    );
    for failure in &outcome.failures {
        println!("  failed: {} ({})", failure.url, failure.error);
    }
    if !outcome.evicted.is_empty() {
        println!("Removed {} old snapshot(s)", outcome.evicted.len());
    }
    if !outcome.compared {
        println!("First snapshot in archive, nothing to compare yet");
    } else if !outcome.has_changes() {
        println!("No changes detected");
    }
}

/// Sleeps for `duration`. Returns false as soon as `ctx` is interrupted.
async fn sleep_unless_interrupted(ctx: &RunContext, duration: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        if ctx.is_interrupted() {
            return false;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep(INTERRUPT_POLL.min(deadline - now)).await;
    }
}
