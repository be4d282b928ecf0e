//! Loading monitored targets from a tabular file.
//!
//! The first column of every row is read as a URL. Rows whose first cell is
//! blank, not an absolute http(s) URL (a header, a comment), or a repeat of an
//! earlier URL are skipped. CSV files and plain one-URL-per-line text files
//! are both accepted.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::snapshot::{ArchiveName, StoreError};

/// Errors raised while loading targets.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The file could not be opened or read.
    #[error("cannot read targets from {path}: {source}")]
    Io {
        /// Targets file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid delimited text.
    #[error("malformed targets file {path}: {source}")]
    Csv {
        /// Targets file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: csv::Error,
    },

    /// No usable URL was found.
    #[error("no valid http(s) URLs found")]
    Empty,

    /// The majority host is not a usable archive name.
    #[error("cannot derive archive name: {0}")]
    ArchiveName(#[source] StoreError),
}

/// Reads targets from the file at `path`.
///
/// # Errors
///
/// Returns [`TargetError::Io`] or [`TargetError::Csv`] when the file cannot be
/// read, and [`TargetError::Empty`] when it holds no usable URL.
pub fn load_targets(path: &Path) -> Result<Vec<String>, TargetError> {
    let file = std::fs::File::open(path).map_err(|source| TargetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let targets = parse_targets(file).map_err(|source| TargetError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    if targets.is_empty() {
        return Err(TargetError::Empty);
    }
    debug!(path = %path.display(), count = targets.len(), "targets loaded");
    Ok(targets)
}

/// Reads targets from any reader; first column only, in file order.
///
/// # Errors
///
/// Returns the `csv` error if a record cannot be decoded.
pub fn parse_targets<R: Read>(reader: R) -> Result<Vec<String>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let Some(cell) = record.get(0).filter(|cell| !cell.is_empty()) else {
            continue;
        };
        match normalize_target(cell) {
            Some(url) => {
                if seen.insert(url.clone()) {
                    targets.push(url);
                } else {
                    debug!(row = row + 1, url = %url, "skipping duplicate target");
                }
            }
            None => warn!(row = row + 1, cell, "skipping row without an http(s) URL"),
        }
    }
    Ok(targets)
}

/// Parses `cell` as an absolute http(s) URL with a host.
#[must_use]
pub fn normalize_target(cell: &str) -> Option<String> {
    let url = Url::parse(cell.trim()).ok()?;
    let supported = matches!(url.scheme(), "http" | "https");
    (supported && url.host_str().is_some()).then(|| url.to_string())
}

/// The host shared by most targets; ties go to the host seen first.
#[must_use]
pub fn primary_domain(targets: &[String]) -> Option<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (index, target) in targets.iter().enumerate() {
        let Some(host) = Url::parse(target)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
        else {
            continue;
        };
        counts.entry(host).or_insert((0, index)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(host, _)| host)
}

/// Archive name for a target set: its primary domain.
///
/// # Errors
///
/// Returns [`TargetError::Empty`] if no target has a host, or
/// [`TargetError::ArchiveName`] if the host is not a valid archive name.
pub fn archive_name_for(targets: &[String]) -> Result<ArchiveName, TargetError> {
    let domain = primary_domain(targets).ok_or(TargetError::Empty)?;
    ArchiveName::new(domain).map_err(TargetError::ArchiveName)
}
