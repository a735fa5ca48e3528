//! Which input properties a unit of work consumes incrementally.

use crate::changes::{InputFileChanges, PropertyChanges};
use crate::error::{FingerprintError, FingerprintResult};
use crate::fingerprint::{CurrentFileCollectionFingerprint, PreviousFileCollectionFingerprint};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// Opaque identity of a property value, as the unit of work sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueToken(String);

impl ValueToken {
    /// Wrap an identity.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The wrapped identity
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The incremental input properties of a unit of work.
///
/// Incremental properties get real changes against the previous execution;
/// the others are reported as if every file were new.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IncrementalInputProperties {
    /// Nothing is incremental
    #[default]
    None,
    /// Every property is incremental
    All,
    /// Only the properties bound to these values are incremental
    Declared(HashMap<ValueToken, String>),
}

impl IncrementalInputProperties {
    /// Declare the incremental properties by value.
    pub fn declared<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = (ValueToken, S)>,
        S: Into<String>,
    {
        Self::Declared(
            properties
                .into_iter()
                .map(|(value, name)| (value, name.into()))
                .collect(),
        )
    }

    /// Name of the incremental property bound to `value`.
    ///
    /// # Errors
    ///
    /// - `NoIncrementalProperties` if nothing is incremental
    /// - `AllPropertiesIncremental` if every property is, so a value names none
    /// - `NotAnIncrementalProperty` if `value` is not declared
    pub fn property_name_for(&self, value: &ValueToken) -> FingerprintResult<&str> {
        match self {
            Self::None => Err(FingerprintError::NoIncrementalProperties {
                value: value.to_string(),
            }),
            Self::All => Err(FingerprintError::AllPropertiesIncremental {
                value: value.to_string(),
            }),
            Self::Declared(by_value) => by_value.get(value).map(String::as_str).ok_or_else(|| {
                let mut declared: Vec<String> = by_value.values().cloned().collect();
                declared.sort();
                FingerprintError::NotAnIncrementalProperty {
                    value: value.to_string(),
                    declared,
                }
            }),
        }
    }

    /// Whether `property_name` is consumed incrementally.
    #[must_use]
    pub fn is_incremental_property(&self, property_name: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Declared(by_value) => by_value.values().any(|name| name == property_name),
        }
    }

    /// Changes of the incremental properties against `previous`.
    ///
    /// An incremental property without a previous fingerprint is reported
    /// as a rebuild.
    #[must_use]
    pub fn incremental_changes<'a>(
        &'a self,
        previous: &'a BTreeMap<String, PreviousFileCollectionFingerprint>,
        current: &'a BTreeMap<String, CurrentFileCollectionFingerprint>,
    ) -> InputFileChanges<'a> {
        let by_name = current
            .iter()
            .filter(|(name, _)| self.is_incremental_property(name))
            .map(|(name, current)| {
                let changes = match previous.get(name) {
                    Some(previous) => PropertyChanges::Incremental { previous, current },
                    None => {
                        debug!("No previous fingerprint for {}, reporting all files", name);
                        PropertyChanges::Rebuild { current }
                    }
                };
                (name.as_str(), changes)
            })
            .collect();
        InputFileChanges::new(self, true, by_name)
    }

    /// Changes of the non-incremental properties: every current file is
    /// added, whatever `previous` holds.
    #[must_use]
    pub fn non_incremental_changes<'a>(
        &'a self,
        previous: &BTreeMap<String, PreviousFileCollectionFingerprint>,
        current: &'a BTreeMap<String, CurrentFileCollectionFingerprint>,
    ) -> InputFileChanges<'a> {
        let by_name: BTreeMap<_, _> = current
            .iter()
            .filter(|(name, _)| !self.is_incremental_property(name))
            .map(|(name, current)| (name.as_str(), PropertyChanges::Rebuild { current }))
            .collect();
        let discarded = by_name.keys().filter(|name| previous.contains_key(**name)).count();
        if discarded > 0 {
            debug!("Not comparing {} previous fingerprints", discarded);
        }
        InputFileChanges::new(self, false, by_name)
    }
}
