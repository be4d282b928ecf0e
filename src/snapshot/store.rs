//! Durable, bounded-depth snapshot store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<archive>/<snapshot-id>/<file-key>.txt   committed snapshots
//! <root>/<archive>/.staging/<snapshot-id>/          snapshot being written
//! <root>/<archive>/.trash/<snapshot-id>/            snapshot being evicted
//! ```
//!
//! A snapshot becomes visible only through a single directory rename from
//! `.staging` into the archive directory, so readers never observe a partial
//! snapshot. Eviction renames out of the archive directory before deleting, so
//! a crash mid-delete leaves only trash behind. Listing ignores dot
//! directories and anything whose name does not parse as a [`SnapshotId`].

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::error::StoreError;
use super::file_key::{file_name_for_key, key_from_file_name};
use super::types::{ArchiveName, PageCapture, Snapshot, SnapshotId};

/// Snapshots kept per archive unless configured otherwise.
pub const DEFAULT_RETENTION: usize = 2;

/// Upper bound on retention depth.
pub const MAX_RETENTION: usize = 100;

const STAGING_DIR: &str = ".staging";
const TRASH_DIR: &str = ".trash";

/// A snapshot reserved by [`SnapshotStore::begin_snapshot`] and not yet committed.
#[derive(Debug)]
pub struct SnapshotHandle {
    archive: ArchiveName,
    id: SnapshotId,
    staging_dir: PathBuf,
}

impl SnapshotHandle {
    /// Identifier the snapshot will be committed under.
    #[must_use]
    pub fn id(&self) -> &SnapshotId {
        &self.id
    }

    /// Archive the snapshot belongs to.
    #[must_use]
    pub fn archive(&self) -> &ArchiveName {
        &self.archive
    }
}

/// File-system snapshot store rooted at one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    retention: usize,
}

impl SnapshotStore {
    /// Creates a store that keeps at most `retention` snapshots per archive.
    ///
    /// The root directory is created lazily on first commit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRetention`] if `retention` is outside `1..=MAX_RETENTION`.
    pub fn new(root: impl Into<PathBuf>, retention: usize) -> Result<Self, StoreError> {
        if !(1..=MAX_RETENTION).contains(&retention) {
            return Err(StoreError::InvalidRetention {
                value: retention,
                max: MAX_RETENTION,
            });
        }
        Ok(Self {
            root: root.into(),
            retention,
        })
    }

    /// Store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maximum snapshots kept per archive.
    #[must_use]
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Directory holding every snapshot of `archive`.
    #[must_use]
    pub fn archive_dir(&self, archive: &ArchiveName) -> PathBuf {
        self.root.join(archive.as_str())
    }

    /// Reserves a new snapshot identifier and creates its staging directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NonMonotonic`] if the new identifier does not sort
    /// after the newest committed snapshot, or [`StoreError::Io`] if the staging
    /// directory cannot be created.
    #[instrument(skip(self), fields(archive = %archive))]
    pub async fn begin_snapshot(&self, archive: &ArchiveName) -> Result<SnapshotHandle, StoreError> {
        let id = SnapshotId::now();
        if let Some(latest) = self.list_snapshots(archive).await?.last()
            && *latest >= id
        {
            return Err(StoreError::NonMonotonic {
                archive: archive.to_string(),
                id: id.to_string(),
                latest: latest.to_string(),
            });
        }

        let staging_dir = self
            .archive_dir(archive)
            .join(STAGING_DIR)
            .join(id.as_str());
        fs::create_dir_all(&staging_dir)
            .await
            .map_err(|e| StoreError::io(&staging_dir, e))?;

        debug!(snapshot = %id, "snapshot staging created");
        Ok(SnapshotHandle {
            archive: archive.clone(),
            id,
            staging_dir,
        })
    }

    /// Writes every capture and publishes the snapshot atomically.
    ///
    /// Captures without a file key are skipped with a warning. When two
    /// captures share a key, the later one wins. On any error the staging
    /// directory is removed and nothing becomes visible.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SnapshotExists`] if a committed snapshot already
    /// has this identifier, or [`StoreError::Io`] if writing or renaming fails.
    #[instrument(skip(self, handle, captures), fields(archive = %handle.archive, snapshot = %handle.id, captures = captures.len()))]
    pub async fn commit(
        &self,
        handle: SnapshotHandle,
        captures: &[PageCapture],
    ) -> Result<Snapshot, StoreError> {
        match self.write_and_publish(&handle, captures).await {
            Ok(snapshot) => Ok(snapshot),
            Err(error) => {
                warn!(error = %error, "snapshot commit failed, discarding staging");
                self.abort(handle).await;
                Err(error)
            }
        }
    }

    async fn write_and_publish(
        &self,
        handle: &SnapshotHandle,
        captures: &[PageCapture],
    ) -> Result<Snapshot, StoreError> {
        let mut keys = BTreeSet::new();
        for capture in captures {
            let Some(key) = capture.file_key() else {
                warn!(url = %capture.url, "capture has no file key, skipping");
                continue;
            };
            if !keys.insert(key.clone()) {
                warn!(key = %key, url = %capture.url, "file key collision, keeping later capture");
            }
            let path = handle.staging_dir.join(file_name_for_key(&key));
            write_synced(&path, capture.text.as_bytes()).await?;
        }

        let final_dir = self.archive_dir(&handle.archive).join(handle.id.as_str());
        if fs::try_exists(&final_dir)
            .await
            .map_err(|e| StoreError::io(&final_dir, e))?
        {
            return Err(StoreError::SnapshotExists {
                archive: handle.archive.to_string(),
                id: handle.id.to_string(),
            });
        }

        fs::rename(&handle.staging_dir, &final_dir)
            .await
            .map_err(|e| StoreError::io(&final_dir, e))?;

        info!(snapshot = %handle.id, files = keys.len(), "snapshot committed");
        Ok(Snapshot::new(
            handle.archive.clone(),
            handle.id.clone(),
            final_dir,
            keys,
        ))
    }

    /// Discards an uncommitted snapshot. Cleanup failures are logged, not returned.
    pub async fn abort(&self, handle: SnapshotHandle) {
        if let Err(e) = fs::remove_dir_all(&handle.staging_dir).await
            && e.kind() != ErrorKind::NotFound
        {
            warn!(
                path = %handle.staging_dir.display(),
                error = %e,
                "failed to remove snapshot staging"
            );
        }
    }

    /// Committed snapshot identifiers of `archive`, oldest first.
    ///
    /// A missing archive directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the archive directory cannot be read.
    pub async fn list_snapshots(&self, archive: &ArchiveName) -> Result<Vec<SnapshotId>, StoreError> {
        let dir = self.archive_dir(archive);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| StoreError::io(entry.path(), e))?
                .is_dir();
            if !is_dir {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match SnapshotId::parse(name) {
                Some(id) => ids.push(id),
                None => debug!(name, "ignoring non-snapshot directory"),
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Opens a committed snapshot, listing its capture files.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the snapshot directory cannot be read.
    pub async fn open_snapshot(
        &self,
        archive: &ArchiveName,
        id: &SnapshotId,
    ) -> Result<Snapshot, StoreError> {
        let dir = self.archive_dir(archive).join(id.as_str());
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let mut keys = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            if let Some(key) = entry.file_name().to_str().and_then(key_from_file_name) {
                keys.insert(key.to_string());
            }
        }

        Ok(Snapshot::new(archive.clone(), id.clone(), dir, keys))
    }

    /// The two newest snapshots as `(previous, latest)`, or `None` if fewer than two exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the archive or a snapshot cannot be read.
    pub async fn latest_two(
        &self,
        archive: &ArchiveName,
    ) -> Result<Option<(Snapshot, Snapshot)>, StoreError> {
        let ids = self.list_snapshots(archive).await?;
        let [.., previous, latest] = ids.as_slice() else {
            return Ok(None);
        };
        let previous = self.open_snapshot(archive, previous).await?;
        let latest = self.open_snapshot(archive, latest).await?;
        Ok(Some((previous, latest)))
    }

    /// Removes the oldest snapshot if the archive holds more than the retention depth.
    ///
    /// Returns the evicted identifier, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the snapshot cannot be moved out of the archive.
    #[instrument(skip(self), fields(archive = %archive))]
    pub async fn evict_oldest(&self, archive: &ArchiveName) -> Result<Option<SnapshotId>, StoreError> {
        let ids = self.list_snapshots(archive).await?;
        if ids.len() <= self.retention {
            return Ok(None);
        }
        let Some(oldest) = ids.into_iter().next() else {
            return Ok(None);
        };

        let archive_dir = self.archive_dir(archive);
        let source = archive_dir.join(oldest.as_str());
        let trash_root = archive_dir.join(TRASH_DIR);
        fs::create_dir_all(&trash_root)
            .await
            .map_err(|e| StoreError::io(&trash_root, e))?;

        let trashed = trash_root.join(oldest.as_str());
        fs::rename(&source, &trashed)
            .await
            .map_err(|e| StoreError::io(&source, e))?;

        if let Err(e) = fs::remove_dir_all(&trashed).await {
            warn!(path = %trashed.display(), error = %e, "evicted snapshot left in trash");
        }

        info!(snapshot = %oldest, "evicted oldest snapshot");
        Ok(Some(oldest))
    }

    /// Evicts until the archive holds at most the retention depth.
    ///
    /// Returns every evicted identifier, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] raised by [`Self::evict_oldest`].
    pub async fn enforce_retention(&self, archive: &ArchiveName) -> Result<Vec<SnapshotId>, StoreError> {
        let mut evicted = Vec::new();
        while let Some(id) = self.evict_oldest(archive).await? {
            evicted.push(id);
        }
        Ok(evicted)
    }
}

async fn write_synced(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn archive() -> ArchiveName {
        ArchiveName::new("ex.com").unwrap()
    }

    async fn commit_pages(store: &SnapshotStore, pages: &[(&str, &str)]) -> Snapshot {
        // Ids have microsecond resolution; keep consecutive commits apart.
        tokio::time::sleep(Duration::from_millis(2)).await;
        let handle = store.begin_snapshot(&archive()).await.unwrap();
        let captures: Vec<PageCapture> = pages
            .iter()
            .map(|(url, text)| PageCapture::new(*url, *text))
            .collect();
        store.commit(handle, &captures).await.unwrap()
    }

    #[test]
    fn test_new_rejects_bad_retention() {
        assert!(matches!(
            SnapshotStore::new("/tmp/x", 0),
            Err(StoreError::InvalidRetention { value: 0, .. })
        ));
        assert!(SnapshotStore::new("/tmp/x", MAX_RETENTION + 1).is_err());
        assert!(SnapshotStore::new("/tmp/x", 1).is_ok());
    }

    #[tokio::test]
    async fn test_commit_writes_files_and_lists() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 2).unwrap();

        let snapshot = commit_pages(
            &store,
            &[("https://ex.com/p1", "Hello\n"), ("https://ex.com/p2", "Bye\n")],
        )
        .await;

        assert_eq!(snapshot.len(), 2);
        let text = std::fs::read_to_string(snapshot.path_for("ex.com_p1")).unwrap();
        assert_eq!(text, "Hello\n");
        assert_eq!(store.list_snapshots(&archive()).await.unwrap(), vec![snapshot.id().clone()]);

        let staging = store.archive_dir(&archive()).join(STAGING_DIR);
        let leftover = std::fs::read_dir(&staging).unwrap().count();
        assert_eq!(leftover, 0, "staging should be empty after commit");
    }

    #[tokio::test]
    async fn test_list_missing_archive_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 2).unwrap();
        assert!(store.list_snapshots(&archive()).await.unwrap().is_empty());
        assert!(store.latest_two(&archive()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_entries() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 2).unwrap();
        let dir = store.archive_dir(&archive());
        std::fs::create_dir_all(dir.join(".staging/2024-01-01_00-00-00.000000")).unwrap();
        std::fs::create_dir_all(dir.join("notes")).unwrap();
        std::fs::write(dir.join("2024-01-01_00-00-00.000000"), "a file").unwrap();

        assert!(store.list_snapshots(&archive()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abort_leaves_nothing_visible() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 2).unwrap();

        let handle = store.begin_snapshot(&archive()).await.unwrap();
        let staging = handle.staging_dir.clone();
        store.abort(handle).await;

        assert!(!staging.exists());
        assert!(store.list_snapshots(&archive()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_collision_keeps_later_capture() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 2).unwrap();

        let snapshot = commit_pages(
            &store,
            &[("https://ex.com/a/b", "first\n"), ("https://ex.com/a_b", "second\n")],
        )
        .await;

        assert_eq!(snapshot.len(), 1);
        let text = std::fs::read_to_string(snapshot.path_for("ex.com_a_b")).unwrap();
        assert_eq!(text, "second\n");
    }

    #[tokio::test]
    async fn test_commit_refuses_existing_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 2).unwrap();

        let handle = store.begin_snapshot(&archive()).await.unwrap();
        let final_dir = store.archive_dir(&archive()).join(handle.id().as_str());
        std::fs::create_dir_all(&final_dir).unwrap();
        let staging = handle.staging_dir.clone();

        let result = store
            .commit(handle, &[PageCapture::new("https://ex.com/p1", "x")])
            .await;

        assert!(matches!(result, Err(StoreError::SnapshotExists { .. })));
        assert!(!staging.exists(), "staging must be discarded on failure");
    }

    #[tokio::test]
    async fn test_begin_rejects_clock_going_back() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 2).unwrap();
        let future = store
            .archive_dir(&archive())
            .join("2999-01-01_00-00-00.000000");
        std::fs::create_dir_all(future).unwrap();

        let result = store.begin_snapshot(&archive()).await;
        assert!(matches!(result, Err(StoreError::NonMonotonic { .. })));
    }

    #[tokio::test]
    async fn test_latest_two_and_open() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 3).unwrap();

        let first = commit_pages(&store, &[("https://ex.com/p1", "1\n")]).await;
        let second = commit_pages(&store, &[("https://ex.com/p1", "2\n")]).await;
        let third = commit_pages(&store, &[("https://ex.com/p1", "3\n")]).await;
        assert!(first.id() < second.id());

        let (previous, latest) = store.latest_two(&archive()).await.unwrap().unwrap();
        assert_eq!(previous.id(), second.id());
        assert_eq!(latest.id(), third.id());
        assert!(latest.keys().contains("ex.com_p1"));
    }

    #[tokio::test]
    async fn test_eviction_keeps_retention_depth() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), 2).unwrap();

        let first = commit_pages(&store, &[("https://ex.com/p1", "1\n")]).await;
        let _second = commit_pages(&store, &[("https://ex.com/p1", "2\n")]).await;
        assert_eq!(store.evict_oldest(&archive()).await.unwrap(), None);

        let _third = commit_pages(&store, &[("https://ex.com/p1", "3\n")]).await;
        let evicted = store.evict_oldest(&archive()).await.unwrap();
        assert_eq!(evicted.as_ref(), Some(first.id()));
        assert_eq!(store.list_snapshots(&archive()).await.unwrap().len(), 2);
        assert!(!first.dir().exists());
    }

    #[tokio::test]
    async fn test_enforce_retention_trims_excess() {
        let temp = TempDir::new().unwrap();
        let wide = SnapshotStore::new(temp.path(), 5).unwrap();
        for n in 0..4 {
            commit_pages(&wide, &[("https://ex.com/p", &n.to_string())]).await;
        }

        let narrow = SnapshotStore::new(temp.path(), 1).unwrap();
        let evicted = narrow.enforce_retention(&archive()).await.unwrap();
        assert_eq!(evicted.len(), 3);
        assert_eq!(narrow.list_snapshots(&archive()).await.unwrap().len(), 1);
    }
}
