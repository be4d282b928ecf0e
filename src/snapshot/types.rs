//! Archive, snapshot, and capture types.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use super::error::StoreError;
use super::file_key::{file_key_for_url, file_name_for_key};

/// `strftime` layout of snapshot identifiers. Fixed width, so string order is time order.
pub const SNAPSHOT_ID_FORMAT: &str = "%Y-%m-%d_%H-%M-%S%.6f";

/// Name of one monitored target set; becomes a directory under the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArchiveName(String);

impl ArchiveName {
    /// Validates `name` as a single, non-hidden path component.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArchiveName`] for empty names, names with
    /// path separators, names starting with `.`, or names longer than 200 bytes.
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.contains(['/', '\\']) {
            Some("name contains a path separator")
        } else if name.starts_with('.') {
            Some("name starts with '.'")
        } else if name.len() > 200 {
            Some("name is longer than 200 bytes")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(StoreError::InvalidArchiveName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Timestamp-derived snapshot identifier; total order equals creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Identifier for the current instant (UTC, microsecond resolution).
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Identifier for a specific instant.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(SNAPSHOT_ID_FORMAT).to_string())
    }

    /// Parses a directory name; `None` if it is not a snapshot identifier.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(value, SNAPSHOT_ID_FORMAT)
            .ok()
            .map(|naive| Self::from_datetime(naive.and_utc()))
            .filter(|parsed| parsed.0 == value)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text captured from one page during one run. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCapture {
    /// Source URL.
    pub url: String,
    /// Extracted page text.
    pub text: String,
    /// When the page was fetched.
    pub captured_at: DateTime<Utc>,
}

impl PageCapture {
    /// Creates a capture stamped with the current time.
    #[must_use]
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            captured_at: Utc::now(),
        }
    }

    /// File key this capture is stored under, if the URL has a host.
    #[must_use]
    pub fn file_key(&self) -> Option<String> {
        file_key_for_url(&self.url)
    }
}

/// A committed, immutable snapshot on disk.
#[derive(Debug, Clone)]
pub struct Snapshot {
    archive: ArchiveName,
    id: SnapshotId,
    dir: PathBuf,
    keys: BTreeSet<String>,
}

impl Snapshot {
    pub(crate) fn new(
        archive: ArchiveName,
        id: SnapshotId,
        dir: PathBuf,
        keys: BTreeSet<String>,
    ) -> Self {
        Self {
            archive,
            id,
            dir,
            keys,
        }
    }

    /// Archive this snapshot belongs to.
    #[must_use]
    pub fn archive(&self) -> &ArchiveName {
        &self.archive
    }

    /// Snapshot identifier.
    #[must_use]
    pub fn id(&self) -> &SnapshotId {
        &self.id
    }

    /// Directory holding the capture files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys of every capture file, ascending.
    #[must_use]
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    /// Number of captures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the snapshot holds no captures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Path of the capture file for `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for_key(key))
    }
}
