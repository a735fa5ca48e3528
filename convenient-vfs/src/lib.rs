//! Watch-driven virtual file system for incremental builds.
//!
//! The [`VirtualFileSystem`] keeps snapshots between builds and drops them
//! when the file watcher reports a change. Each unit of work registers the
//! paths it read with the [`UnitOfWorkVfsChangesRegistry`], which lets the
//! next build skip snapshotting work whose inputs saw no events at all.
//!
//! ```
//! use convenient_snapshot::FileSystemSnapshotter;
//! use convenient_vfs::{
//!     ChangeHandler, FileChangeType, UnitOfWorkVfsChangesRegistry, VirtualFileSystem,
//! };
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("a.txt"), "a").unwrap();
//!
//! let vfs = VirtualFileSystem::new(
//!     FileSystemSnapshotter::default(),
//!     Arc::new(UnitOfWorkVfsChangesRegistry::new()),
//! );
//! let inputs = vfs.read(dir.path()).unwrap();
//! vfs.register_work_inputs(":compile", &[inputs]);
//! vfs.build_finished();
//! assert!(!vfs.registry().has_any_file_input_changed(":compile"));
//!
//! vfs.handle_change(FileChangeType::Modified, &dir.path().join("a.txt"));
//! assert!(vfs.registry().has_any_file_input_changed(":compile"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod error;
pub mod registry;
pub mod vfs;
pub mod watch;

pub use error::{VfsError, VfsResult};
pub use registry::UnitOfWorkVfsChangesRegistry;
pub use vfs::VirtualFileSystem;
pub use watch::{ChangeHandler, FileChangeType, FileWatchEvent};
