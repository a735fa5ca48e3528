//! Errors raised while snapshotting the file system.

use std::path::PathBuf;

/// Error types for snapshot operations.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// A location exists but could not be read (permissions, I/O failure)
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// Location that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be listed
    #[error("Failed to list directory {}: {source}", path.display())]
    Walk {
        /// Directory that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: walkdir::Error,
    },

    /// The location is a socket, pipe or device
    #[error("Cannot snapshot {}: not a regular file", path.display())]
    NotARegularFile {
        /// The offending location
        path: PathBuf,
    },

    /// An include or exclude pattern is not a valid glob
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Parser error
        #[source]
        source: glob::PatternError,
    },
}

impl SnapshotError {
    /// The location the error is attached to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            SnapshotError::Io { path, .. }
            | SnapshotError::Walk { path, .. }
            | SnapshotError::NotARegularFile { path } => Some(path),
            SnapshotError::InvalidPattern { .. } => None,
        }
    }
}

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;
