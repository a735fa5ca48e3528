//! Include/exclude filtering of snapshot trees.

use crate::error::{SnapshotError, SnapshotResult};
use crate::snapshot::{FileSystemLocationSnapshot, FileType};
use glob::{MatchOptions, Pattern};
use std::sync::Arc;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Glob based predicate deciding which entries below a root take part in a
/// fingerprint.
///
/// Patterns are matched against the `/`-separated path relative to the
/// root. `*` stays within one segment, `**` crosses segments. Excludes win
/// over includes; an empty include list includes everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshottingFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl SnapshottingFilter {
    /// Build a filter from include and exclude globs.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::InvalidPattern` for a malformed glob.
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> SnapshotResult<Self> {
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// True if the filter keeps every entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    /// Stable description of the patterns, for configuration hashing.
    #[must_use]
    pub fn describe(&self) -> String {
        let join = |patterns: &[Pattern]| {
            patterns
                .iter()
                .map(Pattern::as_str)
                .collect::<Vec<_>>()
                .join(",")
        };
        format!("include[{}]exclude[{}]", join(&self.includes), join(&self.excludes))
    }

    /// Whether a regular file at `relative_path` is kept.
    #[must_use]
    pub fn includes_file(&self, relative_path: &str) -> bool {
        if self.is_excluded(relative_path) {
            return false;
        }
        self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|pattern| pattern.matches_with(relative_path, MATCH_OPTIONS))
    }

    fn is_excluded(&self, relative_path: &str) -> bool {
        self.excludes
            .iter()
            .any(|pattern| pattern.matches_with(relative_path, MATCH_OPTIONS))
    }

    /// Apply the filter below `root`. The root itself is always kept.
    ///
    /// Excluded entries are removed from the tree and directory hashes are
    /// recomputed. Subtrees with nothing filtered out are shared, not copied.
    #[must_use]
    pub fn apply(&self, root: &Arc<FileSystemLocationSnapshot>) -> Arc<FileSystemLocationSnapshot> {
        if self.is_empty() {
            return Arc::clone(root);
        }
        let mut segments = Vec::new();
        self.filter_directory(root, &mut segments)
            .unwrap_or_else(|| Arc::clone(root))
    }

    /// Returns `None` when nothing below `dir` was filtered out.
    fn filter_directory(
        &self,
        dir: &Arc<FileSystemLocationSnapshot>,
        segments: &mut Vec<String>,
    ) -> Option<Arc<FileSystemLocationSnapshot>> {
        if dir.file_type() != FileType::Directory {
            return None;
        }

        let mut changed = false;
        let mut kept = Vec::with_capacity(dir.children().len());
        for child in dir.children() {
            segments.push(child.name().to_string());
            let relative = segments.join("/");
            let decision = match child.file_type() {
                FileType::Directory if self.is_excluded(&relative) => None,
                FileType::Directory => {
                    let filtered = self.filter_directory(child, segments);
                    let candidate = filtered.clone().unwrap_or_else(|| Arc::clone(child));
                    // Directories only kept for the files they contain, unless named by an include
                    let keep = !candidate.children().is_empty()
                        || self.includes.is_empty()
                        || self
                            .includes
                            .iter()
                            .any(|pattern| pattern.matches_with(&relative, MATCH_OPTIONS));
                    if filtered.is_some() {
                        changed = true;
                    }
                    keep.then_some(candidate)
                }
                _ if self.includes_file(&relative) => Some(Arc::clone(child)),
                _ => None,
            };
            let _ = segments.pop();

            match decision {
                Some(snapshot) => kept.push(snapshot),
                None => changed = true,
            }
        }

        changed.then(|| {
            Arc::new(FileSystemLocationSnapshot::directory(
                dir.absolute_path(),
                kept,
            ))
        })
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> SnapshotResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern.as_ref()).map_err(|source| SnapshotError::InvalidPattern {
                pattern: pattern.as_ref().to_string(),
                source,
            })
        })
        .collect()
}
