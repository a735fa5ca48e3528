//! Path normalization: which part of a location's identity takes part in a
//! fingerprint.

use convenient_snapshot::{FileSystemLocationSnapshot, FileType};
use serde::{Deserialize, Serialize};

/// How an entry's path is reduced to its fingerprint key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathNormalization {
    /// Full absolute path
    AbsolutePath,
    /// Path relative to the collection root
    RelativePath,
    /// File name only
    NameOnly,
    /// No path at all; only the content matters
    Ignored,
}

impl PathNormalization {
    /// Stable identifier, recorded with every fingerprint
    #[must_use]
    pub fn identifier(self) -> &'static str {
        match self {
            Self::AbsolutePath => "ABSOLUTE_PATH",
            Self::RelativePath => "RELATIVE_PATH",
            Self::NameOnly => "NAME_ONLY",
            Self::Ignored => "IGNORED_PATH",
        }
    }

    /// Normalized key of `snapshot`, reached from its root through
    /// `relative` segments, or `None` if the entry is left out.
    ///
    /// Regular files are always kept. Directories below a root are kept
    /// unless directories are ignored or the path is ignored. Roots that are
    /// directories or missing only contribute under absolute paths.
    #[must_use]
    pub fn normalize(
        self,
        snapshot: &FileSystemLocationSnapshot,
        relative: &[&str],
        directories: DirectorySensitivity,
    ) -> Option<String> {
        let is_root = relative.is_empty();
        match snapshot.file_type() {
            FileType::RegularFile => Some(match self {
                Self::AbsolutePath => absolute(snapshot),
                Self::RelativePath if is_root => snapshot.name().to_string(),
                Self::RelativePath => relative.join("/"),
                Self::NameOnly => snapshot.name().to_string(),
                Self::Ignored => snapshot.hash().as_str().to_string(),
            }),
            FileType::Directory if directories == DirectorySensitivity::IgnoreDirectories => None,
            FileType::Directory | FileType::Missing if is_root => {
                (self == Self::AbsolutePath).then(|| absolute(snapshot))
            }
            FileType::Directory | FileType::Missing => match self {
                Self::AbsolutePath => Some(absolute(snapshot)),
                Self::RelativePath => Some(relative.join("/")),
                Self::NameOnly => Some(snapshot.name().to_string()),
                Self::Ignored => None,
            },
        }
    }
}

fn absolute(snapshot: &FileSystemLocationSnapshot) -> String {
    snapshot.absolute_path().to_string_lossy().into_owned()
}

/// Whether directory entries take part in a fingerprint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectorySensitivity {
    /// Directories are entries of their own
    #[default]
    Default,
    /// Only files count; empty directories are invisible
    IgnoreDirectories,
}
