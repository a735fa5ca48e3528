//! Fingerprinting the file properties of a unit of work in parallel.

use crate::config::EngineConfig;
use crate::error::FingerprintResult;
use crate::fingerprint::CurrentFileCollectionFingerprint;
use crate::strategy::FingerprintingStrategy;
use convenient_snapshot::SnapshotSource;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// A named file collection of a unit of work
#[derive(Debug, Clone)]
pub struct FileCollectionProperty {
    /// Property name, unique within the unit of work
    pub name: String,
    /// How the collection is fingerprinted
    pub strategy: FingerprintingStrategy,
    /// Absolute roots, in declaration order
    pub roots: Vec<PathBuf>,
}

impl FileCollectionProperty {
    /// Create a property.
    pub fn new(
        name: impl Into<String>,
        strategy: FingerprintingStrategy,
        roots: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            strategy,
            roots: roots.into_iter().collect(),
        }
    }
}

/// Fingerprints properties on a bounded worker pool.
pub struct Fingerprinter {
    pool: rayon::ThreadPool,
}

impl Fingerprinter {
    /// Create a fingerprinter with `config.worker_threads` workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be started.
    pub fn new(config: &EngineConfig) -> FingerprintResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("fingerprint-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Number of workers
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Snapshot the roots of every property through `source` and
    /// fingerprint them. Properties are processed in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first snapshot error encountered.
    pub fn fingerprint_properties<S>(
        &self,
        source: &S,
        properties: &[FileCollectionProperty],
    ) -> FingerprintResult<BTreeMap<String, CurrentFileCollectionFingerprint>>
    where
        S: SnapshotSource + ?Sized,
    {
        let fingerprints: BTreeMap<_, _> = self.pool.install(|| {
            properties
                .par_iter()
                .map(|property| -> FingerprintResult<_> {
                    let roots = property
                        .roots
                        .iter()
                        .map(|root| source.snapshot(root))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok((property.name.clone(), property.strategy.fingerprint(&roots)))
                })
                .collect::<FingerprintResult<BTreeMap<_, _>>>()
        })?;

        info!(
            "Fingerprinted {} properties on {} workers",
            fingerprints.len(),
            self.worker_count()
        );
        Ok(fingerprints)
    }
}
