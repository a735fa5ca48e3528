//! Boundary to the file watcher.
//!
//! The watcher itself lives outside this crate. It reports what the OS told
//! it through a [`ChangeHandler`].

use std::fmt;
use std::path::{Path, PathBuf};

/// What the watcher observed at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeType {
    /// A location was created
    Created,
    /// A location's content changed
    Modified,
    /// A location was removed
    Removed,
    /// Something happened, the watcher cannot tell what
    Invalidated,
    /// Events were dropped; anything below the path may have changed
    Overflow,
}

impl fmt::Display for FileChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileChangeType::Created => "CREATED",
            FileChangeType::Modified => "MODIFIED",
            FileChangeType::Removed => "REMOVED",
            FileChangeType::Invalidated => "INVALIDATED",
            FileChangeType::Overflow => "OVERFLOW",
        })
    }
}

/// One watcher notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWatchEvent {
    /// Kind of change
    pub change_type: FileChangeType,
    /// Absolute path the change was reported for
    pub path: PathBuf,
}

impl FileWatchEvent {
    /// Create an event.
    pub fn new(change_type: FileChangeType, path: impl Into<PathBuf>) -> Self {
        Self {
            change_type,
            path: path.into(),
        }
    }
}

/// Receives watcher notifications. Called from the watcher's own thread.
pub trait ChangeHandler: Send + Sync {
    /// A single change.
    fn handle_change(&self, change_type: FileChangeType, path: &Path);

    /// Several changes delivered together.
    fn handle_change_batch(&self, events: &[FileWatchEvent]) {
        for event in events {
            self.handle_change(event.change_type, &event.path);
        }
    }

    /// The watcher failed and stopped; nothing it reported can be trusted.
    fn stop_watching_after_error(&self);
}
