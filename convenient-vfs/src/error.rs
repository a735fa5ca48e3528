//! VFS errors

use convenient_snapshot::SnapshotError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the virtual file system
#[derive(Error, Debug)]
pub enum VfsError {
    /// The location could not be snapshotted
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The virtual file system is indexed by absolute paths only
    #[error("Not an absolute path: {}", path.display())]
    RelativePath {
        /// Offending path
        path: PathBuf,
    },
}

/// Result type for VFS operations
pub type VfsResult<T> = Result<T, VfsError>;
