//! Snapshot store: one immutable directory per run, bounded history per archive.
//!
//! # Example
//!
//! ```no_run
//! use sitewatch_core::snapshot::{ArchiveName, PageCapture, SnapshotStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SnapshotStore::new("./archive", 2)?;
//! let archive = ArchiveName::new("ex.com")?;
//!
//! let handle = store.begin_snapshot(&archive).await?;
//! let captures = vec![PageCapture::new("https://ex.com/p1", "Hello\n")];
//! let snapshot = store.commit(handle, &captures).await?;
//! store.enforce_retention(&archive).await?;
//! println!("committed {}", snapshot.id());
//! # Ok(())
//! # }
//! ```

mod error;
mod file_key;
mod store;
mod types;

pub use error::StoreError;
pub use file_key::{
    ESCAPE_CHAR, FILE_EXTENSION, escape_component, file_key_for_url, file_name_for_key,
    key_from_file_name,
};
pub use store::{DEFAULT_RETENTION, MAX_RETENTION, SnapshotHandle, SnapshotStore};
pub use types::{ArchiveName, PageCapture, SNAPSHOT_ID_FORMAT, Snapshot, SnapshotId};
