//! Change reports and the notifier seam.
//!
//! The pipeline never formats transport-specific content. It builds a
//! [`ChangeReport`] and hands it to a [`Notifier`]; delivery (SMTP, chat,
//! files) is the notifier's concern.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::diff::{DiffKind, DiffRecord, LineOp};
use crate::snapshot::{ArchiveName, SnapshotId};

/// Errors raised while delivering a report.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The report could not be written.
    #[error("cannot write report to {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The report could not be serialized.
    #[error("cannot serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Structured description of the changes between two snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
    /// Archive the snapshots belong to.
    pub archive: ArchiveName,
    /// Older snapshot.
    pub previous: SnapshotId,
    /// Newer snapshot.
    pub latest: SnapshotId,
    /// Surfaced records (anything but `Unchanged`), ascending by key.
    pub records: Vec<DiffRecord>,
}

impl ChangeReport {
    /// Subject line for transports that need one.
    #[must_use]
    pub fn subject(&self) -> String {
        format!("Changes detected on {}", self.archive)
    }

    /// Number of files with content changes.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.count(|kind| matches!(kind, DiffKind::Changed { .. }))
    }

    /// Number of files that appeared in the latest snapshot.
    #[must_use]
    pub fn new_count(&self) -> usize {
        self.count(|kind| matches!(kind, DiffKind::NewInLatest))
    }

    /// Number of files that disappeared from the latest snapshot.
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.count(|kind| matches!(kind, DiffKind::MissingFromLatest))
    }

    fn count(&self, predicate: impl Fn(&DiffKind) -> bool) -> usize {
        self.records.iter().filter(|r| predicate(&r.kind)).count()
    }

    /// Renders the report as unified-diff-like plain text.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.subject());
        let _ = writeln!(out, "Compared {} -> {}", self.previous, self.latest);

        for record in &self.records {
            out.push('\n');
            match &record.kind {
                DiffKind::Changed { hunks } => {
                    let _ = writeln!(out, "--- {} ({})", record.key, self.previous);
                    let _ = writeln!(out, "+++ {} ({})", record.key, self.latest);
                    for hunk in hunks {
                        let _ = writeln!(
                            out,
                            "@@ -{},{} +{},{} @@",
                            hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
                        );
                        for line in &hunk.lines {
                            let prefix = match line.op {
                                LineOp::Context => ' ',
                                LineOp::Add => '+',
                                LineOp::Remove => '-',
                            };
                            let _ = writeln!(out, "{prefix}{}", line.text);
                        }
                    }
                }
                DiffKind::NewInLatest => {
                    let _ = writeln!(out, "New page: {}", record.key);
                }
                DiffKind::MissingFromLatest => {
                    let _ = writeln!(out, "Missing page: {}", record.key);
                }
                DiffKind::Unchanged => {}
            }
        }
        out
    }
}

/// Receives change reports from the pipeline.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `report` under `subject`.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] if delivery fails. The pipeline logs it; the
    /// committed snapshot is unaffected.
    async fn notify(&self, subject: &str, report: &ChangeReport) -> Result<(), NotifyError>;
}

/// Logs a summary of every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, report: &ChangeReport) -> Result<(), NotifyError> {
        info!(
            subject,
            changed = report.changed_count(),
            new = report.new_count(),
            missing = report.missing_count(),
            "changes detected"
        );
        for record in &report.records {
            info!(key = %record.key, changed_lines = record.changed_lines().count(), "changed page");
        }
        Ok(())
    }
}

/// Writes every report as pretty JSON to `<dir>/report_<latest-id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileNotifier {
    dir: PathBuf,
}

impl JsonFileNotifier {
    /// Creates a notifier writing into `dir` (created on first report).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Destination directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the report for `latest` is written to.
    #[must_use]
    pub fn report_path(&self, latest: &SnapshotId) -> PathBuf {
        self.dir.join(format!("report_{latest}.json"))
    }
}

#[async_trait]
impl Notifier for JsonFileNotifier {
    #[instrument(skip(self, report), fields(dir = %self.dir.display()))]
    async fn notify(&self, subject: &str, report: &ChangeReport) -> Result<(), NotifyError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| NotifyError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.report_path(&report.latest);
        let json = serde_json::to_vec_pretty(&serde_json::json!({
            "subject": subject,
            "report": report,
        }))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| NotifyError::Io {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "change report written");
        Ok(())
    }
}
