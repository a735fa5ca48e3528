//! Comparing a previous fingerprint with a current one.

use crate::fingerprint::{
    CurrentFileCollectionFingerprint, FileSystemLocationFingerprint, FingerprintHashingStrategy,
    PreviousFileCollectionFingerprint,
};
use convenient_snapshot::FileType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Kind of a file change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// Present now, absent before
    Added,
    /// Present in both with different type or content
    Modified,
    /// Present before, absent now
    Removed,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Removed => "removed",
        })
    }
}

/// Where a change happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    /// Property the file belongs to
    pub property_name: String,
    /// Absolute location
    pub absolute_path: PathBuf,
    /// Key inside the fingerprint
    pub normalized_path: String,
    /// Type now, or before for removals
    pub file_type: FileType,
}

/// A single file level change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// A difference found by comparing against a previous fingerprint
    Detected {
        /// The changed file
        file: ChangedFile,
        /// What happened to it
        change_type: ChangeType,
    },
    /// Reported because nothing is compared; every current entry counts as
    /// added.
    Rebuild {
        /// The current file
        file: ChangedFile,
    },
}

impl FileChange {
    fn detected(
        property_name: &str,
        fingerprint: &FileSystemLocationFingerprint,
        change_type: ChangeType,
    ) -> Self {
        FileChange::Detected {
            file: ChangedFile::of(property_name, fingerprint),
            change_type,
        }
    }

    pub(crate) fn rebuild(
        property_name: &str,
        fingerprint: &FileSystemLocationFingerprint,
    ) -> Self {
        FileChange::Rebuild {
            file: ChangedFile::of(property_name, fingerprint),
        }
    }

    /// What happened. Rebuild changes are always additions.
    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        match self {
            FileChange::Detected { change_type, .. } => *change_type,
            FileChange::Rebuild { .. } => ChangeType::Added,
        }
    }

    /// The changed file
    #[must_use]
    pub fn file(&self) -> &ChangedFile {
        match self {
            FileChange::Detected { file, .. } | FileChange::Rebuild { file } => file,
        }
    }

    /// Absolute location of the changed file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file().absolute_path
    }

    /// Key of the changed file inside its fingerprint
    #[must_use]
    pub fn normalized_path(&self) -> &str {
        &self.file().normalized_path
    }

    /// Property the changed file belongs to
    #[must_use]
    pub fn property_name(&self) -> &str {
        &self.file().property_name
    }

    /// Type of the changed file
    #[must_use]
    pub fn file_type(&self) -> FileType {
        self.file().file_type
    }
}

impl ChangedFile {
    fn of(property_name: &str, fingerprint: &FileSystemLocationFingerprint) -> Self {
        Self {
            property_name: property_name.to_string(),
            absolute_path: fingerprint.absolute_path().to_path_buf(),
            normalized_path: fingerprint.normalized_path().to_string(),
            file_type: fingerprint.file_type(),
        }
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} has been {}.",
            self.file_type(),
            self.path().display(),
            self.change_type()
        )
    }
}

/// Strategy for finding the entry level changes between two fingerprints.
///
/// Visitors return `false` to stop the comparison; the strategy then
/// returns `false` as well.
pub trait FingerprintCompareStrategy {
    /// Visit the changes from `previous` to `current`.
    ///
    /// Identical root hashes mean no changes, without looking at entries.
    /// Added entries are only reported when `include_added` is set.
    fn visit_changes_since<F>(
        &self,
        previous: &PreviousFileCollectionFingerprint,
        current: &CurrentFileCollectionFingerprint,
        property_name: &str,
        include_added: bool,
        visitor: &mut F,
    ) -> bool
    where
        F: FnMut(FileChange) -> bool,
    {
        if previous.has_same_root_hashes(current) {
            trace!("Root hashes of {} are unchanged", property_name);
            return true;
        }
        self.visit_entry_changes(previous, current, property_name, include_added, visitor)
    }

    /// Visit changes by comparing entries. Root hashes are not consulted.
    fn visit_entry_changes<F>(
        &self,
        previous: &PreviousFileCollectionFingerprint,
        current: &CurrentFileCollectionFingerprint,
        property_name: &str,
        include_added: bool,
        visitor: &mut F,
    ) -> bool
    where
        F: FnMut(FileChange) -> bool;
}

/// Matches entries by normalized path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedPathCompareStrategy;

impl FingerprintCompareStrategy for NormalizedPathCompareStrategy {
    fn visit_entry_changes<F>(
        &self,
        previous: &PreviousFileCollectionFingerprint,
        current: &CurrentFileCollectionFingerprint,
        property_name: &str,
        include_added: bool,
        visitor: &mut F,
    ) -> bool
    where
        F: FnMut(FileChange) -> bool,
    {
        entry_changes(previous, current, property_name, include_added).all(visitor)
    }
}

/// Lazily computed entry changes from `previous` to `current`.
///
/// Sorted fingerprints are merged in natural key order. Ordered fingerprints
/// report additions and modifications in current declaration order, then
/// removals in previous declaration order.
pub fn entry_changes<'a>(
    previous: &'a PreviousFileCollectionFingerprint,
    current: &'a CurrentFileCollectionFingerprint,
    property_name: &'a str,
    include_added: bool,
) -> Box<dyn Iterator<Item = FileChange> + 'a> {
    match current.hashing_strategy() {
        FingerprintHashingStrategy::Sorted => Box::new(SortedChanges {
            previous,
            current,
            property_name,
            include_added,
            previous_position: 0,
            current_position: 0,
        }),
        FingerprintHashingStrategy::Ordered => {
            let added_or_modified = current.fingerprints().iter().filter_map(move |now| {
                match previous.get(now.normalized_path()) {
                    None => include_added
                        .then(|| FileChange::detected(property_name, now, ChangeType::Added)),
                    Some(before) if before.differs_from(now) => Some(FileChange::detected(
                        property_name,
                        now,
                        ChangeType::Modified,
                    )),
                    Some(_) => None,
                }
            });
            let removed = previous
                .fingerprints()
                .iter()
                .filter(move |before| current.get(before.normalized_path()).is_none())
                .map(move |before| {
                    FileChange::detected(property_name, before, ChangeType::Removed)
                });
            Box::new(added_or_modified.chain(removed))
        }
    }
}

/// Merge walk over two fingerprints in natural key order
struct SortedChanges<'a> {
    previous: &'a PreviousFileCollectionFingerprint,
    current: &'a CurrentFileCollectionFingerprint,
    property_name: &'a str,
    include_added: bool,
    previous_position: usize,
    current_position: usize,
}

impl SortedChanges<'_> {
    fn removed(&mut self, before: &FileSystemLocationFingerprint) -> Option<FileChange> {
        self.previous_position += 1;
        Some(FileChange::detected(self.property_name, before, ChangeType::Removed))
    }

    fn added(&mut self, now: &FileSystemLocationFingerprint) -> Option<FileChange> {
        self.current_position += 1;
        self.include_added
            .then(|| FileChange::detected(self.property_name, now, ChangeType::Added))
    }
}

impl Iterator for SortedChanges<'_> {
    type Item = FileChange;

    fn next(&mut self) -> Option<FileChange> {
        loop {
            let before = self.previous.sorted_at(self.previous_position);
            let now = self.current.sorted_at(self.current_position);
            let change = match (before, now) {
                (None, None) => return None,
                (Some(before), None) => self.removed(before),
                (None, Some(now)) => self.added(now),
                (Some(before), Some(now)) => {
                    match before.normalized_path().cmp(now.normalized_path()) {
                        Ordering::Less => self.removed(before),
                        Ordering::Greater => self.added(now),
                        Ordering::Equal => {
                            self.previous_position += 1;
                            self.current_position += 1;
                            before.differs_from(now).then(|| {
                                FileChange::detected(self.property_name, now, ChangeType::Modified)
                            })
                        }
                    }
                }
            };
            if change.is_some() {
                return change;
            }
        }
    }
}
