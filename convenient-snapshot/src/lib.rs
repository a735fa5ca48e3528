//! Immutable, Merkle-hashed snapshots of the file system.
//!
//! This crate provides the bottom layer of incremental build support:
//! - Snapshots of files, directories and missing locations
//! - Directory hashes composed from child names, types and hashes
//! - A persistent snapshot hierarchy with structurally shared updates
//! - Glob based include/exclude filtering of snapshot trees
//! - Default excludes for version control metadata
//!
//! # Example
//!
//! ```
//! use convenient_snapshot::{FileSystemSnapshotter, SnapshotHierarchy};
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
//!
//! let snapshot = FileSystemSnapshotter::default().snapshot(dir.path()).unwrap();
//! let hierarchy = SnapshotHierarchy::empty().store(snapshot);
//!
//! let file = hierarchy.find_snapshot(&dir.path().join("a.txt")).unwrap();
//! assert_eq!(file.name(), "a.txt");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod error;
pub mod excludes;
pub mod filter;
pub mod hash;
pub mod hierarchy;
pub mod snapshot;
pub mod snapshotter;

pub use error::{SnapshotError, SnapshotResult};
pub use excludes::{DEFAULT_EXCLUDES, DefaultExcludes};
pub use filter::SnapshottingFilter;
pub use hash::{
    ContentHash, ContentHasher, DIRECTORY_SIGNATURE, EMPTY_COLLECTION_HASH, HashAlgorithm,
    MISSING_FILE_SIGNATURE,
};
pub use hierarchy::SnapshotHierarchy;
pub use snapshot::{
    DirectorySnapshot, FileSystemLocationSnapshot, FileType, MissingFileSnapshot,
    RegularFileSnapshot,
};
pub use snapshotter::{FileSystemSnapshotter, SnapshotSource};
