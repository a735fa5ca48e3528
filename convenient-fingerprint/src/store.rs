//! On-disk execution history

use crate::error::{FingerprintError, FingerprintResult};
use crate::history::{ExecutionRecord, HistoryStore};
use convenient_snapshot::ContentHash;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Write data to a file atomically with fsync for durability
///
/// Write-fsync-rename:
/// 1. Write data to a temporary file
/// 2. fsync the temp file
/// 3. Rename it over the destination
/// 4. fsync the parent directory so the new entry is durable
fn atomic_write(path: &Path, data: &[u8]) -> FingerprintResult<()> {
    let io_error = |source| FingerprintError::History {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(io_error)?;
    file.write_all(data).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(io_error)?;

    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        // Best effort, some filesystems don't support this
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Acquire an exclusive lock on a file
///
/// The lock is released when the returned handle is dropped.
#[cfg(unix)]
fn acquire_lock(path: &Path) -> FingerprintResult<File> {
    use nix::fcntl::{FlockArg, flock};
    use std::os::unix::io::AsRawFd;

    let io_error = |source| FingerprintError::History {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(io_error)?;

    flock(lock_file.as_raw_fd(), FlockArg::LockExclusive)
        .map_err(|errno| io_error(std::io::Error::from(errno)))?;

    Ok(lock_file)
}

/// Execution history stored as one JSON file per unit of work.
///
/// Files live under `<root>/<xx>/<hash>.json`, where the hash is taken from
/// the unit of work identity. Writes are atomic and serialized per record
/// through a lock file, so concurrent builds sharing the directory never
/// see a torn record.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    root: PathBuf,
}

impl FileHistoryStore {
    /// Open (and create) a store at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> FingerprintResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| FingerprintError::History {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Directory holding the records
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        let hash = ContentHash::from_bytes(key.as_bytes());
        let hex = hash.as_str();
        let prefix = hex.get(..2).unwrap_or(hex);
        self.root.join(prefix).join(format!("{hex}.json"))
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self, key: &str) -> FingerprintResult<Option<ExecutionRecord>> {
        let path = self.key_to_path(key);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(FingerprintError::History { path, source }),
        };

        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring unreadable history {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn store(&self, key: &str, record: &ExecutionRecord) -> FingerprintResult<()> {
        let path = self.key_to_path(key);

        #[cfg(unix)]
        let _lock = acquire_lock(&path.with_extension("lock"))?;

        let json = serde_json::to_string_pretty(record)?;
        atomic_write(&path, json.as_bytes())?;
        debug!("Stored history for {} at {}", key, path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> FingerprintResult<()> {
        let path = self.key_to_path(key);

        #[cfg(unix)]
        let _lock = acquire_lock(&path.with_extension("lock"))?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FingerprintError::History { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn record() -> ExecutionRecord {
        ExecutionRecord::new(
            true,
            ContentHash::from_bytes(b"impl"),
            &BTreeMap::new(),
            &BTreeMap::new(),
        )
    }

    #[test]
    fn test_store_and_load() {
        let tmp = TempDir::new().unwrap();
        let store = FileHistoryStore::new(tmp.path().join("history")).unwrap();

        assert!(store.load(":app:compile").unwrap().is_none());
        store.store(":app:compile", &record()).unwrap();
        assert_eq!(store.load(":app:compile").unwrap(), Some(record()));

        // A second store instance sees the same record
        let reopened = FileHistoryStore::new(store.root()).unwrap();
        assert_eq!(reopened.load(":app:compile").unwrap(), Some(record()));

        store.remove(":app:compile").unwrap();
        assert!(store.load(":app:compile").unwrap().is_none());
        store.remove(":app:compile").unwrap();
    }

    #[traced_test]
    #[test]
    fn test_corrupt_record_is_absent() {
        let tmp = TempDir::new().unwrap();
        let store = FileHistoryStore::new(tmp.path()).unwrap();
        store.store("work", &record()).unwrap();

        let path = store.key_to_path("work");
        fs::write(&path, "{ not json").unwrap();

        assert!(store.load("work").unwrap().is_none());
        assert!(logs_contain("Ignoring unreadable history"));
    }
}
