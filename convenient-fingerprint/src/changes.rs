//! Per-property file changes handed to a unit of work.

use crate::compare::{FileChange, entry_changes};
use crate::error::{FingerprintError, FingerprintResult};
use crate::fingerprint::{CurrentFileCollectionFingerprint, PreviousFileCollectionFingerprint};
use crate::incremental::{IncrementalInputProperties, ValueToken};
use std::collections::BTreeMap;
use std::iter;

/// How the changes of one property are produced
#[derive(Debug, Clone, Copy)]
pub(crate) enum PropertyChanges<'a> {
    /// Everything current is reported as added
    Rebuild {
        current: &'a CurrentFileCollectionFingerprint,
    },
    /// Real differences against the previous execution
    Incremental {
        previous: &'a PreviousFileCollectionFingerprint,
        current: &'a CurrentFileCollectionFingerprint,
    },
}

impl<'a> PropertyChanges<'a> {
    fn changes(self, name: &'a str) -> Box<dyn Iterator<Item = FileChange> + 'a> {
        match self {
            PropertyChanges::Rebuild { current } => Box::new(
                current
                    .fingerprints()
                    .iter()
                    .map(move |fingerprint| FileChange::rebuild(name, fingerprint)),
            ),
            PropertyChanges::Incremental { previous, current }
                if previous.has_same_root_hashes(current) =>
            {
                Box::new(iter::empty())
            }
            PropertyChanges::Incremental { previous, current } => {
                entry_changes(previous, current, name, true)
            }
        }
    }
}

/// File changes of the input properties of one execution.
///
/// Nothing is compared up front; each query walks the fingerprints it
/// needs, so a unit of work that only asks for one property pays for one.
#[derive(Debug, Clone)]
pub struct InputFileChanges<'a> {
    properties: &'a IncrementalInputProperties,
    incremental: bool,
    by_name: BTreeMap<&'a str, PropertyChanges<'a>>,
}

impl<'a> InputFileChanges<'a> {
    pub(crate) fn new(
        properties: &'a IncrementalInputProperties,
        incremental: bool,
        by_name: BTreeMap<&'a str, PropertyChanges<'a>>,
    ) -> Self {
        Self {
            properties,
            incremental,
            by_name,
        }
    }

    /// Changes for a full rebuild: every file of every property is added.
    #[must_use]
    pub fn rebuild_all(
        properties: &'a IncrementalInputProperties,
        current: &'a BTreeMap<String, CurrentFileCollectionFingerprint>,
    ) -> Self {
        let by_name = current
            .iter()
            .map(|(name, current)| (name.as_str(), PropertyChanges::Rebuild { current }))
            .collect();
        Self::new(properties, false, by_name)
    }

    /// Whether changes were computed against a previous execution
    #[must_use]
    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    /// Names of the properties that can be queried
    pub fn property_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.by_name.keys().copied()
    }

    /// Changes of the property called `property_name`.
    ///
    /// # Errors
    ///
    /// Returns `FingerprintError::UnknownProperty` if this change set has no
    /// such property.
    pub fn file_changes(
        &self,
        property_name: &str,
    ) -> FingerprintResult<Box<dyn Iterator<Item = FileChange> + 'a>> {
        self.by_name
            .get_key_value(property_name)
            .map(|(&name, &changes)| changes.changes(name))
            .ok_or_else(|| FingerprintError::UnknownProperty {
                name: property_name.to_string(),
            })
    }

    /// Changes of the incremental property bound to `value`.
    ///
    /// # Errors
    ///
    /// Fails if `value` does not identify an incremental property, or that
    /// property is not part of this change set.
    pub fn file_changes_for_value(
        &self,
        value: &ValueToken,
    ) -> FingerprintResult<Box<dyn Iterator<Item = FileChange> + 'a>> {
        let name = self.properties.property_name_for(value)?;
        self.file_changes(name)
    }

    /// Changes of all properties, property by property in name order
    pub fn all_file_changes(&self) -> impl Iterator<Item = FileChange> + '_ {
        self.by_name
            .iter()
            .flat_map(|(&name, &changes)| changes.changes(name))
    }
}
