//! Immutable snapshots of file system locations.
//!
//! A snapshot is one of three variants: a regular file with its content hash,
//! a directory with its children sorted by name, or a missing location.
//! Directory hashes are derived from the children's names, types and hashes
//! (Merkle composition) at construction time and never change afterwards.

use crate::hash::{ContentHash, ContentHasher, MISSING_FILE_SIGNATURE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Type of a file system location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    /// A regular file
    RegularFile,
    /// A directory
    Directory,
    /// Nothing exists at the location
    Missing,
}

impl FileType {
    /// Single byte identifying the type inside combined hashes
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            FileType::RegularFile => b'f',
            FileType::Directory => b'd',
            FileType::Missing => b'm',
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileType::RegularFile => "file",
            FileType::Directory => "directory",
            FileType::Missing => "missing",
        };
        f.write_str(name)
    }
}

/// Snapshot of a regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularFileSnapshot {
    absolute_path: PathBuf,
    name: String,
    hash: ContentHash,
}

impl RegularFileSnapshot {
    /// Content hash of the file
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }
}

/// Snapshot of a directory and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    absolute_path: PathBuf,
    name: String,
    hash: ContentHash,
    children: Vec<Arc<FileSystemLocationSnapshot>>,
}

impl DirectorySnapshot {
    /// Children, sorted by name (byte order)
    #[must_use]
    pub fn children(&self) -> &[Arc<FileSystemLocationSnapshot>] {
        &self.children
    }

    /// Look up a direct child by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Arc<FileSystemLocationSnapshot>> {
        self.children
            .binary_search_by(|child| child.name().cmp(name))
            .ok()
            .map(|index| &self.children[index])
    }

    /// Merkle hash of the directory
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }
}

/// Snapshot of a location where nothing exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFileSnapshot {
    absolute_path: PathBuf,
    name: String,
}

/// One file system location at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSystemLocationSnapshot {
    /// A regular file
    RegularFile(RegularFileSnapshot),
    /// A directory with its children
    Directory(DirectorySnapshot),
    /// A missing location
    Missing(MissingFileSnapshot),
}

impl FileSystemLocationSnapshot {
    /// Snapshot of a regular file with an already computed content hash.
    pub fn regular_file(absolute_path: impl Into<PathBuf>, hash: ContentHash) -> Self {
        let absolute_path = absolute_path.into();
        FileSystemLocationSnapshot::RegularFile(RegularFileSnapshot {
            name: file_name(&absolute_path),
            absolute_path,
            hash,
        })
    }

    /// Snapshot of a directory. Children are sorted by name and the
    /// directory hash is computed from them.
    pub fn directory(
        absolute_path: impl Into<PathBuf>,
        mut children: Vec<Arc<FileSystemLocationSnapshot>>,
    ) -> Self {
        let absolute_path = absolute_path.into();
        children.sort_by(|a, b| a.name().cmp(b.name()));

        let mut hasher = ContentHasher::new();
        hasher.put_tag(FileType::Directory.tag());
        for child in &children {
            hasher.put_str(child.name());
            hasher.put_tag(child.file_type().tag());
            hasher.put_hash(child.hash());
        }

        FileSystemLocationSnapshot::Directory(DirectorySnapshot {
            name: file_name(&absolute_path),
            absolute_path,
            hash: hasher.finish(),
            children,
        })
    }

    /// Snapshot of a missing location.
    pub fn missing(absolute_path: impl Into<PathBuf>) -> Self {
        let absolute_path = absolute_path.into();
        FileSystemLocationSnapshot::Missing(MissingFileSnapshot {
            name: file_name(&absolute_path),
            absolute_path,
        })
    }

    /// Absolute path of the location
    #[must_use]
    pub fn absolute_path(&self) -> &Path {
        match self {
            FileSystemLocationSnapshot::RegularFile(file) => &file.absolute_path,
            FileSystemLocationSnapshot::Directory(dir) => &dir.absolute_path,
            FileSystemLocationSnapshot::Missing(missing) => &missing.absolute_path,
        }
    }

    /// Last path segment, empty for a file system root.
    ///
    /// Names that are not valid UTF-8 are converted lossily. Two such names
    /// in one directory can end up equal, and a lookup by name then finds
    /// either of them.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            FileSystemLocationSnapshot::RegularFile(file) => &file.name,
            FileSystemLocationSnapshot::Directory(dir) => &dir.name,
            FileSystemLocationSnapshot::Missing(missing) => &missing.name,
        }
    }

    /// Type of the location
    #[must_use]
    pub fn file_type(&self) -> FileType {
        match self {
            FileSystemLocationSnapshot::RegularFile(_) => FileType::RegularFile,
            FileSystemLocationSnapshot::Directory(_) => FileType::Directory,
            FileSystemLocationSnapshot::Missing(_) => FileType::Missing,
        }
    }

    /// Content hash for files, Merkle hash for directories, a fixed
    /// signature for missing locations.
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        match self {
            FileSystemLocationSnapshot::RegularFile(file) => &file.hash,
            FileSystemLocationSnapshot::Directory(dir) => &dir.hash,
            FileSystemLocationSnapshot::Missing(_) => &*MISSING_FILE_SIGNATURE,
        }
    }

    /// Children of a directory, empty for other variants.
    #[must_use]
    pub fn children(&self) -> &[Arc<FileSystemLocationSnapshot>] {
        match self {
            FileSystemLocationSnapshot::Directory(dir) => dir.children(),
            _ => &[],
        }
    }

    /// Depth-first, pre-order walk in child-name order.
    ///
    /// The visitor receives each snapshot together with its path segments
    /// relative to `self` (empty for `self`).
    pub fn walk<'a, F>(&'a self, visitor: &mut F)
    where
        F: FnMut(&'a FileSystemLocationSnapshot, &[&'a str]),
    {
        let mut segments = Vec::new();
        self.walk_inner(&mut segments, visitor);
    }

    fn walk_inner<'a, F>(&'a self, segments: &mut Vec<&'a str>, visitor: &mut F)
    where
        F: FnMut(&'a FileSystemLocationSnapshot, &[&'a str]),
    {
        visitor(self, segments.as_slice());
        for child in self.children() {
            segments.push(child.name());
            child.walk_inner(segments, visitor);
            let _ = segments.pop();
        }
    }

    /// Absolute paths of this location and every location below it.
    #[must_use]
    pub fn all_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        self.walk(&mut |snapshot, _| paths.push(snapshot.absolute_path().to_path_buf()));
        paths
    }
}

/// Lossy for non-UTF-8 names, see [`FileSystemLocationSnapshot::name`].
fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
