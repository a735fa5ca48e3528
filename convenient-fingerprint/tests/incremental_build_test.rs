//! Incremental build cycle against a real directory tree
//!
//! Each test runs what a build does for one unit of work:
//! 1. Snapshot and fingerprint the file properties
//! 2. Check the result against the stored history
//! 3. Hand the input changes to the work and record the execution

use convenient_fingerprint::{
    BeforeExecutionState, ChangeType, EngineConfig, ExecutionRecord, FileChange,
    FileCollectionProperty, FileHistoryStore, Fingerprinter, FingerprintCompareStrategy,
    FingerprintHashingStrategy, FingerprintingStrategy, HistoryStore, IncrementalInputProperties,
    InputChangesContext, NormalizedPathCompareStrategy, PathNormalization, UpToDateChecker,
    ValueToken,
};
use convenient_snapshot::{ContentHash, EMPTY_COLLECTION_HASH, FileSystemSnapshotter, HashAlgorithm};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sources(root: &Path) -> FileCollectionProperty {
    FileCollectionProperty::new(
        "sources",
        FingerprintingStrategy::new(PathNormalization::RelativePath),
        [root.join("src")],
    )
}

fn fingerprint_inputs(
    root: &Path,
) -> BTreeMap<String, convenient_fingerprint::CurrentFileCollectionFingerprint> {
    let config = EngineConfig::default();
    Fingerprinter::new(&config)
        .unwrap()
        .fingerprint_properties(&config.snapshotter(), &[sources(root)])
        .unwrap()
}

fn changes_between(
    root: &Path,
    before: impl FnOnce(),
    after: impl FnOnce(),
) -> Vec<(String, ChangeType)> {
    before();
    let previous = fingerprint_inputs(root)
        .remove("sources")
        .unwrap()
        .into_previous();
    after();
    let current = fingerprint_inputs(root).remove("sources").unwrap();

    let mut changes = Vec::new();
    let _ = NormalizedPathCompareStrategy.visit_changes_since(
        &previous,
        &current,
        "sources",
        true,
        &mut |change: FileChange| {
            changes.push((change.normalized_path().to_string(), change.change_type()));
            true
        },
    );
    changes
}

#[test]
fn test_empty_to_populated() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let changes = changes_between(
        root,
        || fs::create_dir_all(root.join("src")).unwrap(),
        || write(root, "src/Main.java", "class Main {}"),
    );
    assert_eq!(changes, vec![("Main.java".to_string(), ChangeType::Added)]);
    assert_ne!(fingerprint_inputs(root)["sources"].hash(), &*EMPTY_COLLECTION_HASH);
}

#[test]
fn test_single_file_content_change() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let changes = changes_between(
        root,
        || write(root, "src/a.txt", "one"),
        || write(root, "src/a.txt", "two"),
    );
    assert_eq!(changes, vec![("a.txt".to_string(), ChangeType::Modified)]);
}

#[test]
fn test_file_removed() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let changes = changes_between(
        root,
        || {
            write(root, "src/a.txt", "a");
            write(root, "src/b.txt", "b");
        },
        || fs::remove_file(root.join("src/a.txt")).unwrap(),
    );
    assert_eq!(changes, vec![("a.txt".to_string(), ChangeType::Removed)]);
}

#[test]
fn test_fingerprinting_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/a.txt", "a");
    write(tmp.path(), "src/nested/b.txt", "b");

    let first = fingerprint_inputs(tmp.path());
    let second = fingerprint_inputs(tmp.path());
    assert_eq!(first["sources"].hash(), second["sources"].hash());
    assert_eq!(first["sources"].fingerprints(), second["sources"].fingerprints());
}

#[test]
fn test_diff_partitions_keys() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let changes = changes_between(
        root,
        || {
            write(root, "src/keep.txt", "same");
            write(root, "src/edit.txt", "old");
            write(root, "src/drop.txt", "gone");
        },
        || {
            write(root, "src/edit.txt", "new");
            fs::remove_file(root.join("src/drop.txt")).unwrap();
            write(root, "src/new/add.txt", "added");
        },
    );
    assert_eq!(
        changes,
        vec![
            ("drop.txt".to_string(), ChangeType::Removed),
            ("edit.txt".to_string(), ChangeType::Modified),
            ("new".to_string(), ChangeType::Added),
            ("new/add.txt".to_string(), ChangeType::Added),
        ]
    );
}

#[test]
fn test_non_incremental_reports_everything_added() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/A.txt", "a");
    write(tmp.path(), "src/B.txt", "b");

    let current = fingerprint_inputs(tmp.path());
    let previous: BTreeMap<_, _> = current
        .iter()
        .map(|(name, fp)| (name.clone(), fp.archive()))
        .collect();

    let properties = IncrementalInputProperties::None;
    let changes: Vec<_> = properties
        .non_incremental_changes(&previous, &current)
        .all_file_changes()
        .map(|c| (c.normalized_path().to_string(), c.change_type()))
        .collect();
    assert_eq!(
        changes,
        vec![
            ("A.txt".to_string(), ChangeType::Added),
            ("B.txt".to_string(), ChangeType::Added),
        ]
    );
}

#[test]
fn test_sorted_and_ordered_collections() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "lib/a.jar", "a");
    write(tmp.path(), "lib/b.jar", "b");
    let a = tmp.path().join("lib/a.jar");
    let b = tmp.path().join("lib/b.jar");

    let snapshotter = FileSystemSnapshotter::default();
    let snap_a = snapshotter.snapshot(&a).unwrap();
    let snap_b = snapshotter.snapshot(&b).unwrap();

    let sorted = FingerprintingStrategy::new(PathNormalization::NameOnly);
    assert_eq!(
        sorted.fingerprint(&[snap_a.clone(), snap_b.clone()]).hash(),
        sorted.fingerprint(&[snap_b.clone(), snap_a.clone()]).hash()
    );

    let ordered = sorted.with_hashing(FingerprintHashingStrategy::Ordered);
    assert_ne!(
        ordered.fingerprint(&[snap_a.clone(), snap_b.clone()]).hash(),
        ordered.fingerprint(&[snap_b, snap_a]).hash()
    );
}

#[test]
fn test_full_cycle_with_file_history() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("project");
    write(&root, "src/main.c", "int main;");
    write(&root, "src/util.c", "int util;");

    let config = EngineConfig {
        hash_algorithm: HashAlgorithm::Xxh3,
        history_dir: tmp.path().join("history"),
        ..EngineConfig::default()
    };
    let snapshotter = config.snapshotter();
    let fingerprinter = Fingerprinter::new(&config).unwrap();
    let store = FileHistoryStore::new(&config.history_dir).unwrap();
    let checker = UpToDateChecker::new(&config);
    let properties = [FileCollectionProperty::new(
        "sources",
        config.strategy(PathNormalization::RelativePath),
        [root.join("src")],
    )];
    let incremental =
        IncrementalInputProperties::declared([(ValueToken::new("compile.sources"), "sources")]);
    let implementation = ContentHash::from_bytes(b"compiler-1.0");

    let before_execution = || BeforeExecutionState {
        implementation_hash: implementation.clone(),
        input_files: fingerprinter
            .fingerprint_properties(&snapshotter, &properties)
            .unwrap(),
        output_files: BTreeMap::new(),
    };

    // First build: no history, full rebuild
    let state = before_execution();
    let verdict = checker.check(store.load(":compile").unwrap().as_ref(), &state);
    assert_eq!(verdict.reasons(), ["No history is available."]);
    let changes =
        InputChangesContext::new(&verdict, &incremental, &state.input_files).input_changes();
    assert_eq!(changes.all_file_changes().count(), 2);
    store
        .store(
            ":compile",
            &ExecutionRecord::new(
                true,
                implementation.clone(),
                &state.input_files,
                &state.output_files,
            ),
        )
        .unwrap();

    // Second build: nothing changed
    let state = before_execution();
    let verdict = checker.check(store.load(":compile").unwrap().as_ref(), &state);
    assert!(verdict.is_up_to_date());

    // Third build: one file edited, the work sees exactly that file
    write(&root, "src/util.c", "int util = 1;");
    let state = before_execution();
    let verdict = checker.check(store.load(":compile").unwrap().as_ref(), &state);
    assert!(!verdict.is_up_to_date());
    assert!(verdict.is_incremental());

    let changes =
        InputChangesContext::new(&verdict, &incremental, &state.input_files).input_changes();
    let changed: Vec<_> = changes
        .file_changes_for_value(&ValueToken::new("compile.sources"))
        .unwrap()
        .map(|c| (c.path().to_path_buf(), c.change_type()))
        .collect();
    assert_eq!(changed, vec![(root.join("src/util.c"), ChangeType::Modified)]);
    assert!(
        changes
            .file_changes_for_value(&ValueToken::new("compile.headers"))
            .is_err()
    );
}
