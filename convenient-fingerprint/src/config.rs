//! Engine configuration

use crate::error::{FingerprintError, FingerprintResult};
use crate::normalization::PathNormalization;
use crate::strategy::FingerprintingStrategy;
use convenient_snapshot::{DEFAULT_EXCLUDES, DefaultExcludes, FileSystemSnapshotter, HashAlgorithm};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings shared by fingerprinting, up-to-date checks and history.
///
/// Every field has a default, so a configuration file only needs to name
/// what it changes:
///
/// ```json
/// { "hash_algorithm": "xxh3", "worker_threads": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hash used for regular file contents
    pub hash_algorithm: HashAlgorithm,
    /// Fingerprinting worker threads (0 = one per CPU)
    pub worker_threads: usize,
    /// Stop collecting out-of-date reasons after this many
    pub max_out_of_date_messages: usize,
    /// Directory holding execution history
    pub history_dir: PathBuf,
    /// File and directory names never snapshotted below a root
    pub default_excludes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            worker_threads: 0,
            max_out_of_date_messages: 3,
            history_dir: PathBuf::from(".convenient-history"),
            default_excludes: DEFAULT_EXCLUDES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> FingerprintResult<Self> {
        let json = fs::read_to_string(path).map_err(|source| FingerprintError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// The configured default excludes
    #[must_use]
    pub fn excludes(&self) -> DefaultExcludes {
        DefaultExcludes::new(self.default_excludes.iter().cloned())
    }

    /// Snapshotter hashing with the configured algorithm and excludes
    #[must_use]
    pub fn snapshotter(&self) -> FileSystemSnapshotter {
        FileSystemSnapshotter::new(self.hash_algorithm).with_default_excludes(self.excludes())
    }

    /// Strategy for `normalization` recording the snapshotter settings, so
    /// changing them makes earlier fingerprints incomparable.
    #[must_use]
    pub fn strategy(&self, normalization: PathNormalization) -> FingerprintingStrategy {
        FingerprintingStrategy::new(normalization)
            .with_hash_algorithm(self.hash_algorithm)
            .with_default_excludes(&self.excludes())
    }
}
