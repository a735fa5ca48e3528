//! Error types for fingerprinting, change queries and execution history

use convenient_snapshot::SnapshotError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while fingerprinting inputs or querying their changes
#[derive(Error, Debug)]
pub enum FingerprintError {
    /// A root of a file collection could not be snapshotted
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Incremental changes were queried by value, but nothing is incremental
    #[error(
        "Cannot query incremental changes for {value}: no incremental properties declared. Query the non-incremental file changes instead."
    )]
    NoIncrementalProperties {
        /// The queried value
        value: String,
    },

    /// The queried value is not one of the declared incremental properties
    #[error(
        "Cannot query incremental changes for {value}: no incremental property found for this value. Incremental properties: {}.",
        declared.join(", ")
    )]
    NotAnIncrementalProperty {
        /// The queried value
        value: String,
        /// Names of the properties that are incremental
        declared: Vec<String>,
    },

    /// Every property is incremental, so a value does not name one property
    #[error(
        "Cannot query incremental changes for {value}: all properties are incremental. Query the changes by property name instead."
    )]
    AllPropertiesIncremental {
        /// The queried value
        value: String,
    },

    /// A change query named a property that was not fingerprinted
    #[error("Unknown file property '{name}'")]
    UnknownProperty {
        /// Requested property name
        name: String,
    },

    /// Reading or writing execution history failed
    #[error("History I/O error at {}: {source}", path.display())]
    History {
        /// History file involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Loading the engine configuration failed
    #[error("Failed to read configuration {}: {source}", path.display())]
    Config {
        /// Configuration file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The fingerprinting worker pool could not be created
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for fingerprint operations
pub type FingerprintResult<T> = Result<T, FingerprintError>;
