//! Immutable, timestamped snapshots taken before every commit.
//!
//! The store writes into the configured backup directory. When that fails for
//! any reason it retries once in a process-wide ephemeral directory and marks
//! the snapshot as a fallback. Only a failure of both locations is an error.
//! Snapshots are created with `create_new` and are never overwritten or
//! removed.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::clock::{MonotonicClock, file_stamp};
use super::error::WorkspaceError;

const BACKUP_TARGET: &str = "digitxmld::backup";

/// Attempts made to find an unused snapshot name before giving up on a
/// location.
const NAME_ATTEMPTS: usize = 8;

/// Where a snapshot ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// The configured backup directory.
    Primary,
    /// The process-wide temporary directory used when the primary failed.
    EphemeralFallback,
}

/// Descriptor of a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backup {
    original_path: Utf8PathBuf,
    location: Utf8PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    storage: StorageKind,
    size: u64,
}

impl Backup {
    /// File the snapshot was taken from.
    #[must_use]
    pub fn original_path(&self) -> &Utf8Path {
        &self.original_path
    }

    /// File holding the snapshot bytes.
    #[must_use]
    pub fn location(&self) -> &Utf8Path {
        &self.location
    }

    /// Moment the snapshot was taken.
    #[must_use]
    pub const fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// Location kind.
    #[must_use]
    pub const fn storage(&self) -> StorageKind {
        self.storage
    }

    /// Snapshot size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// A place snapshots can be written to.
pub trait BackupLocation: Send + Sync {
    /// Kind recorded on snapshots written here.
    fn kind(&self) -> StorageKind;

    /// Writes `bytes` to a new file called `name`, failing with
    /// [`ErrorKind::AlreadyExists`] rather than replacing an existing file.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while creating or writing the file.
    fn persist(&self, name: &str, bytes: &[u8]) -> io::Result<Utf8PathBuf>;
}

/// Directory-backed location.
#[derive(Debug, Clone)]
pub struct DirectoryLocation {
    dir: Utf8PathBuf,
    kind: StorageKind,
}

impl DirectoryLocation {
    /// Location for the configured backup directory.
    #[must_use]
    pub fn primary(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            kind: StorageKind::Primary,
        }
    }

    /// Location under the system temporary directory, unique to this process.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            dir: ephemeral_dir(),
            kind: StorageKind::EphemeralFallback,
        }
    }

    /// Directory snapshots are written into.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }
}

impl BackupLocation for DirectoryLocation {
    fn kind(&self) -> StorageKind {
        self.kind
    }

    fn persist(&self, name: &str, bytes: &[u8]) -> io::Result<Utf8PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(path)
    }
}

/// Process-wide ephemeral backup directory.
#[must_use]
pub fn ephemeral_dir() -> Utf8PathBuf {
    let base = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    base.join(format!("digitxml-backups-{}", std::process::id()))
}

/// Append-only snapshot store with an ephemeral fallback.
pub struct BackupStore {
    primary: Box<dyn BackupLocation>,
    fallback: Box<dyn BackupLocation>,
    clock: Arc<MonotonicClock>,
}

impl BackupStore {
    /// Creates a store writing into `backup_dir`, falling back to
    /// [`ephemeral_dir`].
    #[must_use]
    pub fn new(backup_dir: impl Into<Utf8PathBuf>, clock: Arc<MonotonicClock>) -> Self {
        Self::with_locations(
            Box::new(DirectoryLocation::primary(backup_dir)),
            Box::new(DirectoryLocation::ephemeral()),
            clock,
        )
    }

    /// Creates a store over explicit locations.
    #[must_use]
    pub fn with_locations(
        primary: Box<dyn BackupLocation>,
        fallback: Box<dyn BackupLocation>,
        clock: Arc<MonotonicClock>,
    ) -> Self {
        Self {
            primary,
            fallback,
            clock,
        }
    }

    /// Snapshots the current bytes of `path`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SourceUnreadable`] when the file cannot be
    /// read and [`WorkspaceError::BackupUnavailable`] when neither location
    /// accepts the snapshot.
    pub fn snapshot(&self, path: &Utf8Path) -> Result<Backup, WorkspaceError> {
        let bytes = fs::read(path).map_err(|error| WorkspaceError::source_unreadable(path, &error))?;
        self.store(path, &bytes)
    }

    /// Snapshots `path` when it exists; a missing file yields `None`.
    ///
    /// # Errors
    ///
    /// As for [`BackupStore::snapshot`], except that a missing file is not an
    /// error.
    pub fn snapshot_if_present(&self, path: &Utf8Path) -> Result<Option<Backup>, WorkspaceError> {
        match fs::read(path) {
            Ok(bytes) => self.store(path, &bytes).map(Some),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(target: BACKUP_TARGET, %path, "no prior file to back up");
                Ok(None)
            }
            Err(error) => Err(WorkspaceError::source_unreadable(path, &error)),
        }
    }

    fn store(&self, path: &Utf8Path, bytes: &[u8]) -> Result<Backup, WorkspaceError> {
        let primary_error = match self.store_in(self.primary.as_ref(), path, bytes) {
            Ok(backup) => return Ok(backup),
            Err(error) => error,
        };
        warn!(
            target: BACKUP_TARGET,
            %path,
            error = %primary_error,
            "primary backup location failed, using ephemeral fallback"
        );
        self.store_in(self.fallback.as_ref(), path, bytes)
            .map_err(|fallback_error| WorkspaceError::BackupUnavailable {
                path: path.to_path_buf(),
                primary: primary_error.to_string(),
                fallback: fallback_error.to_string(),
            })
    }

    fn store_in(
        &self,
        location: &dyn BackupLocation,
        path: &Utf8Path,
        bytes: &[u8],
    ) -> io::Result<Backup> {
        let stem = path.file_stem().unwrap_or("document");
        let extension = path.extension().unwrap_or("xml");
        let mut last_error = io::Error::new(ErrorKind::AlreadyExists, "no free snapshot name");
        for _ in 0..NAME_ATTEMPTS {
            let timestamp = self.clock.tick();
            let name = format!("{stem}_{}.{extension}", file_stamp(timestamp));
            match location.persist(&name, bytes) {
                Ok(location_path) => {
                    debug!(
                        target: BACKUP_TARGET,
                        %path,
                        backup = %location_path,
                        "snapshot stored"
                    );
                    return Ok(Backup {
                        original_path: path.to_path_buf(),
                        location: location_path,
                        timestamp,
                        storage: location.kind(),
                        size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
                    });
                }
                Err(error) if error.kind() == ErrorKind::AlreadyExists => last_error = error,
                Err(error) => return Err(error),
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::safety_harness::test_doubles::RejectingLocation;

    struct Workspace {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    #[fixture]
    fn workspace() -> Workspace {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        fs::write(root.join("recipe.xml"), "<recipe/>").expect("seed document");
        Workspace { _dir: dir, root }
    }

    fn store_for(workspace: &Workspace, fallback: Box<dyn BackupLocation>) -> BackupStore {
        BackupStore::with_locations(
            Box::new(DirectoryLocation::primary(workspace.root.join("backups"))),
            fallback,
            Arc::new(MonotonicClock::default()),
        )
    }

    #[rstest]
    fn snapshot_copies_bytes_into_primary(workspace: Workspace) {
        let store = store_for(&workspace, Box::new(RejectingLocation::ephemeral()));
        let backup = store
            .snapshot(&workspace.root.join("recipe.xml"))
            .expect("snapshot");
        assert_eq!(backup.storage(), StorageKind::Primary);
        assert_eq!(backup.size(), 9);
        assert_eq!(
            fs::read_to_string(backup.location()).expect("read backup"),
            "<recipe/>"
        );
        let name = backup.location().file_name().expect("file name");
        assert!(name.starts_with("recipe_") && name.ends_with(".xml"), "{name}");
    }

    #[rstest]
    fn repeated_snapshots_never_collide(workspace: Workspace) {
        let store = store_for(&workspace, Box::new(RejectingLocation::ephemeral()));
        let path = workspace.root.join("recipe.xml");
        let first = store.snapshot(&path).expect("first");
        let second = store.snapshot(&path).expect("second");
        assert!(first.timestamp() < second.timestamp());
        assert_ne!(first.location(), second.location());
        assert!(first.location().exists());
    }

    #[rstest]
    fn unusable_primary_falls_back(workspace: Workspace) {
        fs::write(workspace.root.join("blocker"), "file").expect("blocker");
        let fallback_dir = workspace.root.join("ephemeral");
        let store = BackupStore::with_locations(
            Box::new(DirectoryLocation::primary(workspace.root.join("blocker/backups"))),
            Box::new(DirectoryLocation {
                dir: fallback_dir.clone(),
                kind: StorageKind::EphemeralFallback,
            }),
            Arc::new(MonotonicClock::default()),
        );
        let backup = store
            .snapshot(&workspace.root.join("recipe.xml"))
            .expect("fallback snapshot");
        assert_eq!(backup.storage(), StorageKind::EphemeralFallback);
        assert!(backup.location().starts_with(&fallback_dir));
    }

    #[rstest]
    fn double_failure_is_fatal(workspace: Workspace) {
        let store = BackupStore::with_locations(
            Box::new(RejectingLocation::primary()),
            Box::new(RejectingLocation::ephemeral()),
            Arc::new(MonotonicClock::default()),
        );
        let error = store
            .snapshot(&workspace.root.join("recipe.xml"))
            .expect_err("both locations reject");
        assert_eq!(error.kind(), "backup_unavailable");
    }

    #[rstest]
    fn missing_source_is_reported(workspace: Workspace) {
        let store = store_for(&workspace, Box::new(RejectingLocation::ephemeral()));
        let missing = workspace.root.join("missing.xml");
        let error = store.snapshot(&missing).expect_err("missing source");
        assert_eq!(error.kind(), "source_unreadable");
        assert_eq!(store.snapshot_if_present(&missing).expect("optional"), None);
    }
}
