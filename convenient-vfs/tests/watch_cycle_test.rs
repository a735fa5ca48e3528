//! Builds across watcher events
//!
//! The VFS serves snapshots to the fingerprinter. Between builds the test
//! plays the watcher and edits files on disk.

use convenient_fingerprint::{
    ChangeType, EngineConfig, FileCollectionProperty, Fingerprinter, FingerprintingStrategy,
    IncrementalInputProperties, PathNormalization,
};
use convenient_snapshot::FileSystemSnapshotter;
use convenient_vfs::{
    ChangeHandler, FileChangeType, FileWatchEvent, UnitOfWorkVfsChangesRegistry, VirtualFileSystem,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const WORK: &str = ":app:compile";

fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("src/util")).unwrap();
    fs::write(tmp.path().join("src/main.c"), "int main;").unwrap();
    fs::write(tmp.path().join("src/util/str.c"), "int str;").unwrap();
    fs::write(tmp.path().join("README"), "readme").unwrap();
    tmp
}

fn vfs() -> VirtualFileSystem {
    VirtualFileSystem::new(
        FileSystemSnapshotter::default(),
        Arc::new(UnitOfWorkVfsChangesRegistry::new()),
    )
}

fn sources(root: &Path) -> [FileCollectionProperty; 1] {
    [FileCollectionProperty::new(
        "sources",
        FingerprintingStrategy::new(PathNormalization::RelativePath),
        [root.join("src")],
    )]
}

/// One build of the unit of work: returns whether its inputs may have
/// changed. Inputs are registered on every build, only the last one counts.
fn build(vfs: &VirtualFileSystem, root: &Path) -> bool {
    vfs.build_started();
    let changed = vfs.registry().has_any_file_input_changed(WORK);
    let inputs = vfs.read(&root.join("src")).unwrap();
    vfs.register_work_inputs(WORK, &[inputs]);
    vfs.build_finished();
    changed
}

#[test]
fn test_vfs_serves_fingerprinter() {
    let tmp = project();
    let vfs = vfs();
    let config = EngineConfig::default();
    let fingerprinter = Fingerprinter::new(&config).unwrap();

    let first = fingerprinter
        .fingerprint_properties(&vfs, &sources(tmp.path()))
        .unwrap();
    let cached = vfs.hierarchy().find_snapshot(&tmp.path().join("src/main.c"));
    assert!(cached.is_some());

    fs::write(tmp.path().join("src/main.c"), "int main = 0;").unwrap();
    vfs.handle_change(FileChangeType::Modified, &tmp.path().join("src/main.c"));

    let second = fingerprinter
        .fingerprint_properties(&vfs, &sources(tmp.path()))
        .unwrap();
    let previous: BTreeMap<_, _> = first
        .into_iter()
        .map(|(name, fingerprint)| (name, fingerprint.into_previous()))
        .collect();

    let properties = IncrementalInputProperties::All;
    let changes: Vec<_> = properties
        .incremental_changes(&previous, &second)
        .all_file_changes()
        .map(|change| (change.normalized_path().to_string(), change.change_type()))
        .collect();
    assert_eq!(changes, vec![("main.c".to_string(), ChangeType::Modified)]);
}

#[test]
fn test_unchanged_work_is_skipped() {
    let tmp = project();
    let vfs = vfs();

    assert!(build(&vfs, tmp.path()), "first build has no registration");
    assert!(!build(&vfs, tmp.path()));

    // Outside the inputs
    vfs.handle_change(FileChangeType::Modified, &tmp.path().join("README"));
    assert!(!build(&vfs, tmp.path()));

    // Inside a registered directory
    vfs.handle_change(FileChangeType::Created, &tmp.path().join("src/util/new.c"));
    assert!(build(&vfs, tmp.path()));
    assert!(!build(&vfs, tmp.path()));
}

#[test]
fn test_overflow_above_inputs() {
    let tmp = project();
    let vfs = vfs();
    let _ = build(&vfs, tmp.path());

    vfs.handle_change_batch(&[
        FileWatchEvent::new(FileChangeType::Modified, tmp.path().join("README")),
        FileWatchEvent::new(FileChangeType::Overflow, tmp.path()),
    ]);
    assert!(vfs.hierarchy().is_empty());
    assert!(build(&vfs, tmp.path()));
}

#[test]
fn test_watcher_error_invalidates_everything() {
    let tmp = project();
    let vfs = vfs();
    let _ = build(&vfs, tmp.path());
    assert!(!build(&vfs, tmp.path()));

    vfs.stop_watching_after_error();
    assert!(!vfs.is_watching());
    assert!(build(&vfs, tmp.path()));

    // Unwatched edits are never seen as events
    fs::write(tmp.path().join("src/main.c"), "int main = 1;").unwrap();
    assert!(build(&vfs, tmp.path()));
    assert!(build(&vfs, tmp.path()));
    assert!(vfs.hierarchy().is_empty());
}

#[test]
fn test_change_during_build_is_kept_for_next_build() {
    let tmp = project();
    let vfs = vfs();
    let _ = build(&vfs, tmp.path());

    vfs.build_started();
    let inputs = vfs.read(&tmp.path().join("src")).unwrap();
    vfs.register_work_inputs(WORK, &[inputs]);
    // The file changes after the work read it
    vfs.handle_change(FileChangeType::Modified, &tmp.path().join("src/main.c"));
    vfs.build_finished();

    assert!(build(&vfs, tmp.path()));
}
