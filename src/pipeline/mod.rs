//! Change detection pipeline: one run turns target fetches into a change report.
//!
//! A run moves through fixed stages:
//!
//! ```text
//! Idle -> Fetching -> Committing -> Evicting -> Diffing -> Notifying -> Idle
//! ```
//!
//! - **Fetching**: every target is fetched in parallel (bounded by the
//!   configured concurrency) with retry on transient failures. Failed targets
//!   are left out of the snapshot, never fatal.
//! - **Committing**: successful captures are written to staging and published
//!   atomically. If nothing was captured, nothing is committed.
//! - **Evicting**: the oldest snapshots are removed until the archive holds at
//!   most the retention depth. Only reached after a successful commit.
//! - **Diffing**: the two newest snapshots are compared.
//! - **Notifying**: surfaced records are handed to the [`Notifier`].
//!
//! A storage failure ends the run with [`PipelineError::Storage`]; previously
//! committed snapshots are untouched. The caller's interrupt flag is checked
//! before fetching and before committing.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitewatch_core::context::RunContext;
//! use sitewatch_core::fetch::HttpClient;
//! use sitewatch_core::pipeline::{ChangeDetectionPipeline, LogNotifier, PipelineConfig};
//! use sitewatch_core::snapshot::{ArchiveName, SnapshotStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SnapshotStore::new("./archive", 2)?;
//! let pipeline = ChangeDetectionPipeline::new(
//!     store,
//!     Arc::new(HttpClient::new()),
//!     Arc::new(LogNotifier),
//!     PipelineConfig::default(),
//! )?;
//!
//! let targets = vec!["https://example.com/".to_string()];
//! let archive = ArchiveName::new("example.com")?;
//! let outcome = pipeline.run_once(&RunContext::new(), &archive, &targets).await?;
//! println!("captured {} pages", outcome.captured);
//! # Ok(())
//! # }
//! ```

mod notifier;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

pub use notifier::{ChangeReport, JsonFileNotifier, LogNotifier, Notifier, NotifyError};

use crate::context::{RunContext, RunProgress};
use crate::diff::Differ;
use crate::extract::extract_page_text;
use crate::fetch::{
    FailureType, FetchError, FetchedPage, PageFetcher, RetryDecision, RetryPolicy, classify_error,
};
use crate::snapshot::{ArchiveName, PageCapture, SnapshotId, SnapshotStore, StoreError};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Stage of the run currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    /// No run in progress.
    Idle,
    /// Fetching targets.
    Fetching,
    /// Writing and publishing the snapshot.
    Committing,
    /// Removing snapshots beyond the retention depth.
    Evicting,
    /// Comparing the two newest snapshots.
    Diffing,
    /// Handing the report to the notifier.
    Notifying,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Committing => "committing",
            Self::Evicting => "evicting",
            Self::Diffing => "diffing",
            Self::Notifying => "notifying",
        };
        f.write_str(name)
    }
}

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The run was given no targets.
    #[error("no targets to capture")]
    NoTargets,

    /// Another run on this pipeline has not finished.
    #[error("a run is already in progress ({stage})")]
    AlreadyRunning {
        /// Stage of the run in progress.
        stage: RunStage,
    },

    /// The caller interrupted the run.
    #[error("run interrupted before {stage}")]
    Interrupted {
        /// Stage that was not started.
        stage: RunStage,
    },

    /// Every target failed; no snapshot was committed.
    #[error("nothing captured: all {failed} targets failed")]
    NothingCaptured {
        /// Number of failed targets.
        failed: usize,
    },

    /// The snapshot store failed; the archive keeps its previous state.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Tunables for [`ChangeDetectionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum parallel fetches (1-100).
    pub concurrency: usize,
    /// Retry policy for failed fetches.
    pub retry_policy: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// A target that could not be captured this run.
#[derive(Debug)]
pub struct CaptureFailure {
    /// Target URL.
    pub url: String,
    /// Last error seen.
    pub error: FetchError,
    /// Attempts made.
    pub attempts: u32,
}

/// What a successful run did.
#[derive(Debug)]
pub struct RunOutcome {
    /// Archive the run wrote to.
    pub archive: ArchiveName,
    /// Snapshot committed by this run.
    pub snapshot: SnapshotId,
    /// Pages captured into the snapshot.
    pub captured: usize,
    /// Targets left out of the snapshot.
    pub failures: Vec<CaptureFailure>,
    /// Snapshots removed to honor the retention depth.
    pub evicted: Vec<SnapshotId>,
    /// Whether two snapshots existed and were compared.
    pub compared: bool,
    /// Files that could not be compared.
    pub comparison_failures: usize,
    /// The report, when anything was surfaced.
    pub report: Option<ChangeReport>,
    /// Whether the notifier accepted the report.
    pub notified: bool,
}

impl RunOutcome {
    /// Whether the run surfaced any change.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.report.is_some()
    }
}

/// Orchestrates fetch, commit, eviction, diff and notification for one archive at a time.
///
/// Runs on one pipeline are serialized: a second concurrent call to
/// [`run_once`](Self::run_once) fails with [`PipelineError::AlreadyRunning`].
pub struct ChangeDetectionPipeline {
    store: SnapshotStore,
    fetcher: Arc<dyn PageFetcher>,
    notifier: Arc<dyn Notifier>,
    differ: Differ,
    config: PipelineConfig,
    stage: Mutex<RunStage>,
}

impl fmt::Debug for ChangeDetectionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDetectionPipeline")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("stage", &self.stage())
            .finish_non_exhaustive()
    }
}

impl ChangeDetectionPipeline {
    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConcurrency`] if the configured
    /// concurrency is outside 1-100.
    #[instrument(level = "debug", skip(store, fetcher, notifier, config))]
    pub fn new(
        store: SnapshotStore,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn Notifier>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(PipelineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }

        debug!(
            concurrency = config.concurrency,
            max_attempts = config.retry_policy.max_attempts(),
            retention = store.retention(),
            root = %store.root().display(),
            "creating change detection pipeline"
        );

        Ok(Self {
            store,
            fetcher,
            notifier,
            differ: Differ::default(),
            config,
            stage: Mutex::new(RunStage::Idle),
        })
    }

    /// Replaces the differ (e.g. to change the context line count).
    #[must_use]
    pub fn with_differ(mut self, differ: Differ) -> Self {
        self.differ = differ;
        self
    }

    /// The snapshot store.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage of the run in progress, or `Idle`.
    #[must_use]
    pub fn stage(&self) -> RunStage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Performs one full run for `archive` over `targets`.
    ///
    /// Progress counters in `ctx` are reset and updated as targets finish.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::AlreadyRunning`] if another run is in progress
    /// - [`PipelineError::NoTargets`] if `targets` is empty
    /// - [`PipelineError::Interrupted`] if `ctx` was interrupted before fetching or committing
    /// - [`PipelineError::NothingCaptured`] if every target failed
    /// - [`PipelineError::Storage`] if committing, evicting or reading snapshots fails
    ///
    /// Individual fetch failures and notifier failures do NOT fail the run.
    #[instrument(skip(self, ctx, targets), fields(archive = %archive, targets = targets.len()))]
    pub async fn run_once(
        &self,
        ctx: &RunContext,
        archive: &ArchiveName,
        targets: &[String],
    ) -> Result<RunOutcome, PipelineError> {
        let tracker = StageTracker::start(&self.stage)?;

        if targets.is_empty() {
            return Err(PipelineError::NoTargets);
        }
        if ctx.is_interrupted() {
            return Err(PipelineError::Interrupted {
                stage: RunStage::Fetching,
            });
        }

        tracker.enter(RunStage::Fetching);
        let progress = ctx.progress();
        progress.reset();
        progress.add_total(targets.len());
        let (captures, failures) = self.fetch_all(targets, progress).await?;

        if ctx.is_interrupted() {
            return Err(PipelineError::Interrupted {
                stage: RunStage::Committing,
            });
        }
        if captures.is_empty() {
            warn!(failed = failures.len(), "no page captured, skipping commit");
            return Err(PipelineError::NothingCaptured {
                failed: failures.len(),
            });
        }

        tracker.enter(RunStage::Committing);
        let handle = self.store.begin_snapshot(archive).await?;
        let snapshot = self.store.commit(handle, &captures).await?;

        tracker.enter(RunStage::Evicting);
        let evicted = self.store.enforce_retention(archive).await?;

        tracker.enter(RunStage::Diffing);
        let mut outcome = RunOutcome {
            archive: archive.clone(),
            snapshot: snapshot.id().clone(),
            captured: snapshot.len(),
            failures,
            evicted,
            compared: false,
            comparison_failures: 0,
            report: None,
            notified: false,
        };

        let Some((previous, latest)) = self.store.latest_two(archive).await? else {
            info!(snapshot = %outcome.snapshot, "first snapshot in archive, nothing to compare");
            return Ok(outcome);
        };

        let differ = self.differ.clone();
        let (previous_id, latest_id) = (previous.id().clone(), latest.id().clone());
        let diff = tokio::task::spawn_blocking(move || differ.diff(&previous, &latest)).await?;
        outcome.compared = true;
        outcome.comparison_failures = diff.failures.len();

        if !diff.has_changes() {
            info!(previous = %previous_id, latest = %latest_id, "no changes detected");
            return Ok(outcome);
        }

        tracker.enter(RunStage::Notifying);
        let report = ChangeReport {
            archive: archive.clone(),
            previous: previous_id,
            latest: latest_id,
            records: diff.surfaced().cloned().collect(),
        };
        let subject = report.subject();
        match self.notifier.notify(&subject, &report).await {
            Ok(()) => outcome.notified = true,
            Err(e) => warn!(error = %e, "notifier failed, report not delivered"),
        }
        info!(
            changed = report.changed_count(),
            new = report.new_count(),
            missing = report.missing_count(),
            "run complete with changes"
        );
        outcome.report = Some(report);

        Ok(outcome)
    }

    /// Fetches every target, bounded by the configured concurrency.
    ///
    /// Captures are returned in target order.
    async fn fetch_all(
        &self,
        targets: &[String],
        progress: &Arc<RunProgress>,
    ) -> Result<(Vec<PageCapture>, Vec<CaptureFailure>), PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(targets.len());

        for url in targets {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::SemaphoreClosed)?;

            let fetcher = Arc::clone(&self.fetcher);
            let policy = self.config.retry_policy.clone();
            let task_url = url.clone();
            let task_progress = Arc::clone(progress);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = capture_with_retry(fetcher.as_ref(), &task_url, &policy).await;
                match &result {
                    Ok(_) => task_progress.record_success(),
                    Err(_) => task_progress.record_failure(),
                }
                result
            });
            handles.push((url.clone(), handle));
        }

        let mut captures = Vec::new();
        let mut failures = Vec::new();
        for (url, handle) in handles {
            match handle.await {
                Ok(Ok(capture)) => captures.push(capture),
                Ok(Err((error, attempts))) => {
                    warn!(url = %url, error = %error, attempts, "target excluded from snapshot");
                    failures.push(CaptureFailure {
                        url,
                        error,
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "fetch task panicked, target excluded from snapshot");
                    progress.record_failure();
                    failures.push(CaptureFailure {
                        error: FetchError::aborted(&url),
                        url,
                        attempts: 0,
                    });
                }
            }
        }

        info!(
            captured = captures.len(),
            failed = failures.len(),
            "fetch stage complete"
        );
        Ok((captures, failures))
    }
}

/// Fetches one target, retrying transient failures, and extracts its text.
///
/// Non-2xx responses become [`FetchError::HttpStatus`] here.
#[instrument(skip(fetcher, policy))]
async fn capture_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    policy: &RetryPolicy,
) -> Result<PageCapture, (FetchError, u32)> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting fetch");

        match fetcher.fetch(url).await.and_then(FetchedPage::error_for_status) {
            Ok(page) => {
                let text = extract_page_text(&page.body);
                return Ok(PageCapture::new(url, text));
            }
            Err(e) => {
                let failure_type = classify_error(&e);
                match policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        info!(
                            url,
                            attempt = next_attempt,
                            max_attempts = policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            rate_limited = failure_type == FailureType::RateLimited,
                            error = %e,
                            "retrying fetch"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url, %reason, "not retrying fetch");
                        return Err((e, attempt));
                    }
                }
            }
        }
    }
}

/// Owns the stage slot for one run; resets it to `Idle` on drop.
struct StageTracker<'a> {
    stage: &'a Mutex<RunStage>,
}

impl<'a> StageTracker<'a> {
    fn start(stage: &'a Mutex<RunStage>) -> Result<Self, PipelineError> {
        let mut current = stage.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != RunStage::Idle {
            return Err(PipelineError::AlreadyRunning { stage: *current });
        }
        *current = RunStage::Fetching;
        Ok(Self { stage })
    }

    fn enter(&self, next: RunStage) {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner) = next;
        debug!(stage = %next, "entering stage");
    }
}

impl Drop for StageTracker<'_> {
    fn drop(&mut self) {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner) = RunStage::Idle;
    }
}
