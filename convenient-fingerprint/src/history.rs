//! Records of previous executions.

use crate::error::FingerprintResult;
use crate::fingerprint::{
    CurrentFileCollectionFingerprint, FileCollectionFingerprint, FileSystemLocationFingerprint,
    FingerprintHashingStrategy, PreviousFileCollectionFingerprint, RootHash,
};
use crate::normalization::PathNormalization;
use convenient_snapshot::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Persisted form of one file collection fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Strategy that produced the fingerprint
    pub strategy_identifier: String,
    /// Path normalization of the entries
    pub normalization: PathNormalization,
    /// How the entries were combined
    pub hashing: FingerprintHashingStrategy,
    /// Hash of the full strategy configuration
    pub strategy_configuration_hash: ContentHash,
    /// Combined hash of the entries
    pub hash: ContentHash,
    /// Entries in declaration order
    pub entries: Vec<FileSystemLocationFingerprint>,
    /// Root snapshot hashes
    pub root_hashes: Vec<RootHash>,
}

impl From<&CurrentFileCollectionFingerprint> for FingerprintRecord {
    fn from(fingerprint: &CurrentFileCollectionFingerprint) -> Self {
        Self {
            strategy_identifier: fingerprint.strategy_identifier().to_string(),
            normalization: fingerprint.normalization(),
            hashing: fingerprint.hashing_strategy(),
            strategy_configuration_hash: fingerprint.strategy_configuration_hash().clone(),
            hash: fingerprint.hash().clone(),
            entries: fingerprint.fingerprints().to_vec(),
            root_hashes: fingerprint.root_hashes().to_vec(),
        }
    }
}

impl FingerprintRecord {
    /// Restore the fingerprint. The recorded hash is kept as is, so a
    /// damaged record shows up through
    /// [`is_self_consistent`](FileCollectionFingerprint::is_self_consistent).
    #[must_use]
    pub fn to_previous(&self) -> PreviousFileCollectionFingerprint {
        FileCollectionFingerprint::assemble(
            self.normalization,
            self.hashing,
            self.strategy_configuration_hash.clone(),
            self.entries.clone(),
            self.root_hashes.clone(),
            Some(self.hash.clone()),
        )
    }
}

/// What is remembered about one execution of a unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Whether the execution succeeded
    pub successful: bool,
    /// Hash of the unit of work's implementation
    pub implementation_hash: ContentHash,
    /// Input file property fingerprints by property name
    pub input_files: BTreeMap<String, FingerprintRecord>,
    /// Output file property fingerprints by property name
    pub output_files: BTreeMap<String, FingerprintRecord>,
}

impl ExecutionRecord {
    /// Record an execution.
    #[must_use]
    pub fn new(
        successful: bool,
        implementation_hash: ContentHash,
        input_files: &BTreeMap<String, CurrentFileCollectionFingerprint>,
        output_files: &BTreeMap<String, CurrentFileCollectionFingerprint>,
    ) -> Self {
        Self {
            successful,
            implementation_hash,
            input_files: to_records(input_files),
            output_files: to_records(output_files),
        }
    }

    /// Restored input fingerprints
    #[must_use]
    pub fn previous_input_files(&self) -> BTreeMap<String, PreviousFileCollectionFingerprint> {
        restore(&self.input_files)
    }

    /// Restored output fingerprints
    #[must_use]
    pub fn previous_output_files(&self) -> BTreeMap<String, PreviousFileCollectionFingerprint> {
        restore(&self.output_files)
    }
}

fn to_records(
    fingerprints: &BTreeMap<String, CurrentFileCollectionFingerprint>,
) -> BTreeMap<String, FingerprintRecord> {
    fingerprints
        .iter()
        .map(|(name, fingerprint)| (name.clone(), FingerprintRecord::from(fingerprint)))
        .collect()
}

fn restore(
    records: &BTreeMap<String, FingerprintRecord>,
) -> BTreeMap<String, PreviousFileCollectionFingerprint> {
    records
        .iter()
        .map(|(name, record)| (name.clone(), record.to_previous()))
        .collect()
}

/// Storage of execution records, keyed by unit of work identity.
pub trait HistoryStore: Send + Sync {
    /// Latest record for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read. An unreadable record is
    /// not an error; it is reported as absent.
    fn load(&self, key: &str) -> FingerprintResult<Option<ExecutionRecord>>;

    /// Replace the record for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn store(&self, key: &str, record: &ExecutionRecord) -> FingerprintResult<()>;

    /// Forget `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be removed.
    fn remove(&self, key: &str) -> FingerprintResult<()>;
}

/// History kept in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: Mutex<HashMap<String, ExecutionRecord>>,
}

impl InMemoryHistoryStore {
    /// An empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, ExecutionRecord>> {
        // A panic while holding the lock cannot leave a half-written record
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn load(&self, key: &str) -> FingerprintResult<Option<ExecutionRecord>> {
        Ok(self.records().get(key).cloned())
    }

    fn store(&self, key: &str, record: &ExecutionRecord) -> FingerprintResult<()> {
        let _ = self.records().insert(key.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> FingerprintResult<()> {
        let _ = self.records().remove(key);
        Ok(())
    }
}
