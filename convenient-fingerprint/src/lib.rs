//! Fingerprints of file collections and change detection between builds.
//!
//! This crate turns snapshots into comparable fingerprints and answers the
//! two questions an incremental build asks of every unit of work:
//! - Does it have to run again? ([`UpToDateChecker`])
//! - Which input files changed since the last run? ([`InputFileChanges`])
//!
//! # Example
//!
//! ```
//! use convenient_fingerprint::{
//!     ChangeType, ExecutionRecord, IncrementalInputProperties, PathNormalization,
//!     FingerprintingStrategy,
//! };
//! use convenient_snapshot::{ContentHash, FileSystemSnapshotter};
//! use std::collections::BTreeMap;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("main.c"), "int main;").unwrap();
//!
//! let snapshotter = FileSystemSnapshotter::default();
//! let strategy = FingerprintingStrategy::new(PathNormalization::RelativePath);
//! let fingerprint = |dir: &std::path::Path| {
//!     let mut inputs = BTreeMap::new();
//!     inputs.insert(
//!         "sources".to_string(),
//!         strategy.fingerprint(&[snapshotter.snapshot(dir).unwrap()]),
//!     );
//!     inputs
//! };
//!
//! let first = fingerprint(dir.path());
//! let record =
//!     ExecutionRecord::new(true, ContentHash::from_bytes(b"v1"), &first, &BTreeMap::new());
//!
//! std::fs::write(dir.path().join("util.c"), "int util;").unwrap();
//! let second = fingerprint(dir.path());
//!
//! let previous = record.previous_input_files();
//! let properties = IncrementalInputProperties::All;
//! let changes: Vec<_> = properties
//!     .incremental_changes(&previous, &second)
//!     .all_file_changes()
//!     .collect();
//! assert_eq!(changes.len(), 1);
//! assert_eq!(changes[0].normalized_path(), "util.c");
//! assert_eq!(changes[0].change_type(), ChangeType::Added);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod changes;
pub mod compare;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod fingerprinter;
pub mod history;
pub mod incremental;
pub mod normalization;
pub mod store;
pub mod strategy;
pub mod up_to_date;

pub use changes::InputFileChanges;
pub use compare::{
    ChangeType, ChangedFile, FileChange, FingerprintCompareStrategy,
    NormalizedPathCompareStrategy, entry_changes,
};
pub use config::EngineConfig;
pub use error::{FingerprintError, FingerprintResult};
pub use fingerprint::{
    Current, CurrentFileCollectionFingerprint, FileCollectionFingerprint,
    FileSystemLocationFingerprint, FingerprintHashingStrategy, Previous,
    PreviousFileCollectionFingerprint, RootHash, append_to_hasher,
};
pub use fingerprinter::{FileCollectionProperty, Fingerprinter};
pub use history::{ExecutionRecord, FingerprintRecord, HistoryStore, InMemoryHistoryStore};
pub use incremental::{IncrementalInputProperties, ValueToken};
pub use normalization::{DirectorySensitivity, PathNormalization};
pub use store::FileHistoryStore;
pub use strategy::FingerprintingStrategy;
pub use up_to_date::{BeforeExecutionState, InputChangesContext, UpToDateChecker, UpToDateVerdict};
