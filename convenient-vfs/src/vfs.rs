//! Virtual file system: the snapshot hierarchy of a build session, kept in
//! sync with the disk through watcher events.

use crate::error::{VfsError, VfsResult};
use crate::registry::UnitOfWorkVfsChangesRegistry;
use crate::watch::{ChangeHandler, FileChangeType, FileWatchEvent};
use convenient_snapshot::{
    FileSystemLocationSnapshot, FileSystemSnapshotter, SnapshotHierarchy, SnapshotResult,
    SnapshotSource,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

/// Snapshot cache of a build session.
///
/// Readers take the current hierarchy and work on it without holding a
/// lock. Writers swap in a new hierarchy under the write lock.
#[derive(Debug)]
pub struct VirtualFileSystem {
    root: RwLock<SnapshotHierarchy>,
    snapshotter: FileSystemSnapshotter,
    registry: Arc<UnitOfWorkVfsChangesRegistry>,
    /// Bumped on every invalidation
    generation: AtomicU64,
    watching: AtomicBool,
}

impl VirtualFileSystem {
    /// An empty VFS feeding changes into `registry`.
    #[must_use]
    pub fn new(
        snapshotter: FileSystemSnapshotter,
        registry: Arc<UnitOfWorkVfsChangesRegistry>,
    ) -> Self {
        Self {
            root: RwLock::new(SnapshotHierarchy::empty()),
            snapshotter,
            registry,
            generation: AtomicU64::new(0),
            watching: AtomicBool::new(true),
        }
    }

    /// The change registry this VFS reports to
    #[must_use]
    pub fn registry(&self) -> &Arc<UnitOfWorkVfsChangesRegistry> {
        &self.registry
    }

    /// Whether watcher events are still trusted
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire)
    }

    /// The current hierarchy
    #[must_use]
    pub fn hierarchy(&self) -> SnapshotHierarchy {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update<F>(&self, change: F)
    where
        F: FnOnce(&SnapshotHierarchy) -> SnapshotHierarchy,
    {
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        *root = change(&root);
    }

    /// Snapshot of `path`, from the hierarchy if known, otherwise from disk.
    ///
    /// Once watching has stopped, nothing read is retained and every read
    /// goes to disk.
    ///
    /// # Errors
    ///
    /// - `VfsError::RelativePath` if `path` is not absolute
    /// - `VfsError::Snapshot` if the location cannot be read
    pub fn read(&self, path: &Path) -> VfsResult<Arc<FileSystemLocationSnapshot>> {
        if path.is_relative() {
            return Err(VfsError::RelativePath {
                path: path.to_path_buf(),
            });
        }
        Ok(self.read_absolute(path)?)
    }

    fn read_absolute(&self, path: &Path) -> SnapshotResult<Arc<FileSystemLocationSnapshot>> {
        if !self.is_watching() {
            return self.snapshotter.snapshot(path);
        }
        if let Some(snapshot) = self.hierarchy().find_snapshot(path) {
            return Ok(snapshot);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let snapshot = self.snapshotter.snapshot(path)?;

        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        // An invalidation while reading may have made the snapshot stale
        if self.generation.load(Ordering::Acquire) == generation && self.is_watching() {
            *root = root.store(Arc::clone(&snapshot));
        } else {
            debug!("Not storing snapshot of {}, it changed while reading", path.display());
        }
        Ok(snapshot)
    }

    /// Drop everything known at or below `paths`. Returns the number of
    /// snapshots removed.
    pub fn invalidate<'a, I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut removed = 0;
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        let _ = self.generation.fetch_add(1, Ordering::AcqRel);
        for path in paths {
            *root = root.invalidate(path, &mut |_| removed += 1);
        }
        removed
    }

    /// Forget all file system state and all input registrations.
    pub fn invalidate_all(&self) {
        let _ = self.generation.fetch_add(1, Ordering::AcqRel);
        self.update(|_| SnapshotHierarchy::empty());
        self.registry.invalidate_all();
    }

    /// Register the snapshots `roots` as the file inputs of `identity`,
    /// with every location inside them.
    pub fn register_work_inputs(&self, identity: &str, roots: &[Arc<FileSystemLocationSnapshot>]) {
        self.registry.register_file_inputs(
            identity,
            roots.iter().flat_map(|root| root.all_paths()),
        );
    }

    /// Start of a build. Without a watcher nothing from earlier builds can
    /// be trusted.
    pub fn build_started(&self) {
        if !self.is_watching() {
            self.invalidate_all();
        }
        let retained = self.hierarchy().root_snapshots().len();
        info!(
            "Virtual file system retained {} snapshots, watching: {}",
            retained,
            self.is_watching()
        );
    }

    /// End of a build: roll the registry over to the next build, or drop
    /// all state when the file system is no longer watched.
    pub fn build_finished(&self) {
        if self.is_watching() {
            self.registry.invalidate_changes();
        } else {
            info!("Dropping VFS state, the file system is not watched");
            self.invalidate_all();
        }
    }

    fn apply_change(&self, change_type: FileChangeType, path: &Path) -> usize {
        if change_type == FileChangeType::Overflow {
            warn!(
                "File watcher overflowed for {}, everything below it is considered changed",
                path.display()
            );
        }
        let removed = self.invalidate([path]);
        self.registry.register_change(change_type, path);
        removed
    }
}

impl ChangeHandler for VirtualFileSystem {
    fn handle_change(&self, change_type: FileChangeType, path: &Path) {
        debug!("Handling VFS change {} {}", change_type, path.display());
        let _ = self.apply_change(change_type, path);
    }

    fn handle_change_batch(&self, events: &[FileWatchEvent]) {
        debug!("Handling {} VFS changes", events.len());
        let removed: usize = events
            .iter()
            .map(|event| self.apply_change(event.change_type, &event.path))
            .sum();
        debug!("Removed {} snapshots", removed);
    }

    fn stop_watching_after_error(&self) {
        error!("Stopping file watching and invalidating VFS after an error happened");
        self.watching.store(false, Ordering::Release);
        self.invalidate_all();
    }
}

impl SnapshotSource for VirtualFileSystem {
    fn snapshot(&self, path: &Path) -> SnapshotResult<Arc<FileSystemLocationSnapshot>> {
        if path.is_relative() {
            return self.snapshotter.snapshot(path);
        }
        self.read_absolute(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn vfs() -> VirtualFileSystem {
        VirtualFileSystem::new(
            FileSystemSnapshotter::default(),
            Arc::new(UnitOfWorkVfsChangesRegistry::new()),
        )
    }

    #[test]
    fn test_read_is_cached() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let vfs = vfs();

        let first = vfs.read(tmp.path()).unwrap();
        let second = vfs.read(tmp.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let child = vfs.read(&tmp.path().join("a.txt")).unwrap();
        assert!(Arc::ptr_eq(&child, &first.children()[0]));
    }

    #[test]
    fn test_relative_path_is_rejected() {
        assert!(matches!(
            vfs().read(Path::new("relative/a.txt")),
            Err(VfsError::RelativePath { .. })
        ));
    }

    #[traced_test]
    #[test]
    fn test_change_invalidates_and_marks_work() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let vfs = vfs();

        let snapshot = vfs.read(tmp.path()).unwrap();
        vfs.register_work_inputs(":compile", &[snapshot]);
        vfs.build_finished();
        assert!(!vfs.registry().has_any_file_input_changed(":compile"));

        fs::write(&file, "changed").unwrap();
        vfs.handle_change(FileChangeType::Modified, &file);

        assert!(logs_contain("Handling VFS change MODIFIED"));
        assert!(vfs.registry().has_any_file_input_changed(":compile"));
        assert!(vfs.hierarchy().find_snapshot(&file).is_none());
        let reread = vfs.read(&file).unwrap();
        assert_eq!(
            reread.hash(),
            &FileSystemSnapshotter::default().algorithm().hash_bytes(b"changed")
        );
    }

    #[test]
    fn test_overflow_invalidates_hierarchy() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("h/sub")).unwrap();
        fs::write(tmp.path().join("h/sub/x.txt"), "x").unwrap();
        let vfs = vfs();

        let snapshot = vfs.read(&tmp.path().join("h")).unwrap();
        vfs.register_work_inputs("reader", &[snapshot]);
        vfs.build_finished();

        vfs.handle_change_batch(&[FileWatchEvent::new(
            FileChangeType::Overflow,
            tmp.path().join("h"),
        )]);
        assert!(vfs.hierarchy().is_empty());
        assert!(vfs.registry().has_any_file_input_changed("reader"));
    }

    #[traced_test]
    #[test]
    fn test_stop_watching_after_error() {
        let tmp = TempDir::new().unwrap();
        let vfs = vfs();
        let _ = vfs.read(tmp.path()).unwrap();

        vfs.stop_watching_after_error();
        assert!(!vfs.is_watching());
        assert!(vfs.hierarchy().is_empty());
        assert!(logs_contain("Stopping file watching"));
    }

    #[traced_test]
    #[test]
    fn test_unwatched_builds_read_from_disk() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let vfs = vfs();
        vfs.stop_watching_after_error();

        vfs.build_started();
        let snapshot = vfs.read(tmp.path()).unwrap();
        vfs.register_work_inputs("w", &[snapshot]);
        vfs.build_finished();
        assert!(vfs.hierarchy().is_empty());
        assert!(logs_contain("Dropping VFS state"));

        // No event arrives for this write
        fs::write(&file, "changed").unwrap();

        vfs.build_started();
        assert!(vfs.registry().has_any_file_input_changed("w"));
        let reread = vfs.read(&file).unwrap();
        assert_eq!(
            reread.hash(),
            &FileSystemSnapshotter::default().algorithm().hash_bytes(b"changed")
        );
        vfs.register_work_inputs("w", &[reread]);
        vfs.build_finished();

        vfs.build_started();
        assert!(vfs.registry().has_any_file_input_changed("w"));
    }

    #[test]
    fn test_invalidate_counts_removed_snapshots() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        let vfs = vfs();
        let _ = vfs.read(tmp.path()).unwrap();

        // The root directory is split and a.txt dropped
        assert_eq!(vfs.invalidate([tmp.path().join("a.txt").as_path()]), 2);
        assert!(vfs.hierarchy().find_snapshot(&tmp.path().join("b.txt")).is_some());
        assert_eq!(vfs.invalidate([Path::new("/nowhere/known")]), 0);
    }
}
