//! Snapshotting the real file system.

use crate::error::{SnapshotError, SnapshotResult};
use crate::excludes::DefaultExcludes;
use crate::hash::HashAlgorithm;
use crate::snapshot::FileSystemLocationSnapshot;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Anything that can hand out a snapshot for an absolute path.
///
/// Implemented by the plain snapshotter and by caching layers in front of it.
pub trait SnapshotSource: Sync {
    /// Snapshot `path` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns a `SnapshotError` if the location exists but cannot be read.
    fn snapshot(&self, path: &Path) -> SnapshotResult<Arc<FileSystemLocationSnapshot>>;
}

/// Produces snapshots by stat-ing and reading the file system.
///
/// Entries below the snapshotted root that match the default excludes are
/// left out. The root itself is always snapshotted.
#[derive(Debug, Clone, Default)]
pub struct FileSystemSnapshotter {
    algorithm: HashAlgorithm,
    excludes: DefaultExcludes,
}

impl FileSystemSnapshotter {
    /// Create a snapshotter hashing file contents with `algorithm`.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            excludes: DefaultExcludes::default(),
        }
    }

    /// Replace the default excludes.
    #[must_use]
    pub fn with_default_excludes(mut self, excludes: DefaultExcludes) -> Self {
        self.excludes = excludes;
        self
    }

    /// Algorithm used for regular file contents
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Names skipped while walking directories
    #[must_use]
    pub fn default_excludes(&self) -> &DefaultExcludes {
        &self.excludes
    }

    /// Snapshot `path` and everything below it.
    ///
    /// A path that does not exist yields a missing snapshot. A path that
    /// exists but cannot be read is an error attached to that path. Links
    /// are followed, except a link to a directory containing it, which is
    /// skipped.
    ///
    /// # Errors
    ///
    /// - `SnapshotError::Io` if a file or its metadata cannot be read
    /// - `SnapshotError::Walk` if a directory cannot be listed
    /// - `SnapshotError::NotARegularFile` for sockets, pipes and devices
    pub fn snapshot(&self, path: &Path) -> SnapshotResult<Arc<FileSystemLocationSnapshot>> {
        debug!("Snapshotting {}", path.display());
        self.snapshot_location(path).map(Arc::new)
    }

    fn snapshot_location(&self, path: &Path) -> SnapshotResult<FileSystemLocationSnapshot> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(FileSystemLocationSnapshot::missing(path));
            }
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if metadata.is_dir() {
            self.snapshot_directory(path)
        } else if !metadata.is_file() {
            Err(SnapshotError::NotARegularFile {
                path: path.to_path_buf(),
            })
        } else {
            let content = fs::read(path).map_err(|source| SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(FileSystemLocationSnapshot::regular_file(
                path,
                self.algorithm.hash_bytes(&content),
            ))
        }
    }

    fn snapshot_directory(&self, path: &Path) -> SnapshotResult<FileSystemLocationSnapshot> {
        let mut children = Vec::new();

        for entry in walkdir::WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| SnapshotError::Walk {
                path: path.to_path_buf(),
                source,
            })?;

            if entry.path_is_symlink() && is_link_cycle(path, entry.path())? {
                debug!("Skipping symbolic link cycle at {}", entry.path().display());
                continue;
            }
            if self.is_excluded(&entry) {
                continue;
            }

            children.push(Arc::new(self.snapshot_location(entry.path())?));
        }

        Ok(FileSystemLocationSnapshot::directory(path, children))
    }

    fn is_excluded(&self, entry: &walkdir::DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if entry.path().is_dir() {
            self.excludes.exclude_directory(&name)
        } else {
            self.excludes.exclude_file(&name)
        }
    }
}

impl SnapshotSource for FileSystemSnapshotter {
    fn snapshot(&self, path: &Path) -> SnapshotResult<Arc<FileSystemLocationSnapshot>> {
        FileSystemSnapshotter::snapshot(self, path)
    }
}

/// Whether `link` points to a directory containing it. Following such a
/// link would make the walk recurse forever.
fn is_link_cycle(parent: &Path, link: &Path) -> SnapshotResult<bool> {
    let target = match fs::canonicalize(link) {
        Ok(target) => target,
        // Dangling links are snapshotted as missing
        Err(_) => return Ok(false),
    };
    if !target.is_dir() {
        return Ok(false);
    }
    let parent = fs::canonicalize(parent).map_err(|source| SnapshotError::Io {
        path: parent.to_path_buf(),
        source,
    })?;
    Ok(parent.starts_with(&target))
}
