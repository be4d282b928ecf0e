//! Error types for the snapshot store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`SnapshotStore`](super::SnapshotStore).
///
/// Every variant is a storage failure: the current run stops at the commit
/// boundary and previously committed snapshots are left as they were.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error on a staging, snapshot, or archive path.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A snapshot with the same identifier is already committed.
    #[error("snapshot {id} already exists in archive {archive}")]
    SnapshotExists {
        /// Archive name.
        archive: String,
        /// Colliding snapshot identifier.
        id: String,
    },

    /// A new identifier would not sort after the newest committed one (clock moved back).
    #[error("snapshot {id} is not newer than {latest} in archive {archive}")]
    NonMonotonic {
        /// Archive name.
        archive: String,
        /// Rejected identifier.
        id: String,
        /// Newest committed identifier.
        latest: String,
    },

    /// Archive names become directory names and must be a single safe path component.
    #[error("invalid archive name {name:?}: {reason}")]
    InvalidArchiveName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Retention depth outside the supported range.
    #[error("invalid retention {value}: must be between 1 and {max}")]
    InvalidRetention {
        /// The rejected value.
        value: usize,
        /// Upper bound.
        max: usize,
    },
}

impl StoreError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let msg = StoreError::io("/tmp/archive", io_error).to_string();
        assert!(msg.contains("/tmp/archive"), "Expected path in: {msg}");
    }

    #[test]
    fn test_store_error_exists_display() {
        let msg = StoreError::SnapshotExists {
            archive: "ex.com".to_string(),
            id: "2024-01-01_00-00-00.000000".to_string(),
        }
        .to_string();
        assert!(msg.contains("ex.com"));
        assert!(msg.contains("2024-01-01_00-00-00.000000"));
    }
}
