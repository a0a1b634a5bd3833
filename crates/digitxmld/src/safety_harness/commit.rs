//! Atomic writes and restore-from-backup.

use std::fs;
use std::io::{self, ErrorKind, Write};

use camino::Utf8Path;
use tempfile::NamedTempFile;
use tracing::{error, info};

use super::backup::Backup;

const COMMIT_TARGET: &str = "digitxmld::commit";

/// Writes committed documents to disk.
pub trait DocumentWriter: Send + Sync {
    /// Replaces the contents of `path` with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error that prevented the write.
    fn write(&self, path: &Utf8Path, bytes: &[u8]) -> io::Result<()>;
}

/// Writes to a temporary file beside the target and renames it into place.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicWriter;

impl DocumentWriter for AtomicWriter {
    fn write(&self, path: &Utf8Path, bytes: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(bytes)?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}

/// Puts `path` back to its pre-commit state.
///
/// With a backup the snapshot bytes are written back atomically; without one
/// the file did not exist before and any partial output is removed.
///
/// # Errors
///
/// Returns the I/O error that prevented the restore.
pub(crate) fn restore(path: &Utf8Path, backup: Option<&Backup>) -> io::Result<()> {
    let result = match backup {
        Some(backup) => {
            let bytes = fs::read(backup.location())?;
            AtomicWriter.write(path, &bytes)
        }
        None => match fs::remove_file(path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        },
    };
    match &result {
        Ok(()) => info!(target: COMMIT_TARGET, %path, "restored pre-commit state"),
        Err(err) => error!(target: COMMIT_TARGET, %path, error = %err, "restore failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    use super::*;
    use crate::safety_harness::backup::BackupStore;
    use crate::safety_harness::clock::MonotonicClock;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
        (dir, root)
    }

    #[test]
    fn atomic_write_replaces_content() {
        let (_dir, root) = temp_root();
        let path = root.join("doc.xml");
        fs::write(&path, "<old/>").expect("seed");
        AtomicWriter.write(&path, b"<new/>").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "<new/>");
        let leftovers = fs::read_dir(&root).expect("list").count();
        assert_eq!(leftovers, 1, "temporary file must be renamed away");
    }

    #[test]
    fn restore_rewrites_backup_bytes() {
        let (_dir, root) = temp_root();
        let path = root.join("doc.xml");
        fs::write(&path, "<old/>").expect("seed");
        let store = BackupStore::new(root.join("backups"), Arc::new(MonotonicClock::default()));
        let backup = store.snapshot(&path).expect("snapshot");
        fs::write(&path, "<partial").expect("simulate partial write");

        restore(&path, Some(&backup)).expect("restore");
        assert_eq!(fs::read_to_string(&path).expect("read"), "<old/>");
    }

    #[test]
    fn restore_without_backup_removes_new_file() {
        let (_dir, root) = temp_root();
        let path = root.join("fresh.xml");
        fs::write(&path, "<partial").expect("simulate partial write");
        restore(&path, None).expect("restore");
        assert!(!path.exists());
        restore(&path, None).expect("restoring an absent file is a no-op");
    }
}
