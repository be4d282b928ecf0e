//! Persisting crawl results.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::info;

use crate::snapshot::escape_component;

/// Errors raised while exporting.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The destination could not be created or written.
    #[error("cannot write export {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A row could not be encoded.
    #[error("cannot encode export {path}: {source}")]
    Csv {
        /// Destination path.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },
}

/// Identifies one export: crawled domain plus local export time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportId {
    domain: String,
    created_at: DateTime<Local>,
}

impl ExportId {
    /// Export identifier stamped with the current local time.
    #[must_use]
    pub fn now(domain: &str) -> Self {
        Self::at(domain, Local::now())
    }

    /// Export identifier for a specific time.
    #[must_use]
    pub fn at(domain: &str, created_at: DateTime<Local>) -> Self {
        Self {
            domain: domain.to_string(),
            created_at,
        }
    }

    /// File stem: `visited_urls_<domain>_<YYYY-MM-DD_HH-MM>`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!(
            "visited_urls_{}_{}",
            escape_component(&self.domain),
            self.created_at.format("%Y-%m-%d_%H-%M")
        )
    }
}

/// Consumer of a finished crawl's sorted URL list.
pub trait Exporter {
    /// Persists `urls` under `id` and returns where they went.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`] when the destination cannot be written.
    fn export(&self, id: &ExportId, urls: &[String]) -> Result<PathBuf, ExportError>;
}

/// Writes one `URL` column with a header row to `<dir>/<stem>.csv`.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    /// Creates an exporter writing into `dir` (created if missing).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Destination directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the export for `id` is written to.
    #[must_use]
    pub fn path_for(&self, id: &ExportId) -> PathBuf {
        self.dir.join(format!("{}.csv", id.file_stem()))
    }
}

impl Exporter for CsvExporter {
    fn export(&self, id: &ExportId, urls: &[String]) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ExportError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(id);
        let csv_error = |source| ExportError::Csv {
            path: path.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        writer.write_record(["URL"]).map_err(csv_error)?;
        for url in urls {
            writer.write_record([url]).map_err(csv_error)?;
        }
        writer.flush().map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), rows = urls.len(), "crawl results exported");
        Ok(path)
    }
}
