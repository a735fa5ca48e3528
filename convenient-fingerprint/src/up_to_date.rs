//! Deciding whether a unit of work has to run again.
//!
//! The checker compares the state before an execution with the record of
//! the previous execution and collects human readable reasons. It stops
//! comparing as soon as it has collected enough reasons, so an out-of-date
//! unit of work with thousands of changed files costs a handful of visits.

use crate::changes::InputFileChanges;
use crate::compare::{FingerprintCompareStrategy, NormalizedPathCompareStrategy};
use crate::config::EngineConfig;
use crate::fingerprint::{
    CurrentFileCollectionFingerprint, FingerprintHashingStrategy,
    PreviousFileCollectionFingerprint,
};
use crate::history::ExecutionRecord;
use crate::incremental::IncrementalInputProperties;
use convenient_snapshot::ContentHash;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// What is known about a unit of work right before it would execute
#[derive(Debug, Clone)]
pub struct BeforeExecutionState {
    /// Hash of the unit of work's implementation
    pub implementation_hash: ContentHash,
    /// Current input file fingerprints by property name
    pub input_files: BTreeMap<String, CurrentFileCollectionFingerprint>,
    /// Current output file fingerprints by property name
    pub output_files: BTreeMap<String, CurrentFileCollectionFingerprint>,
}

/// Outcome of an up-to-date check
#[derive(Debug, Clone)]
pub struct UpToDateVerdict {
    reasons: Vec<String>,
    incremental: bool,
    previous_inputs: BTreeMap<String, PreviousFileCollectionFingerprint>,
}

impl UpToDateVerdict {
    /// True if nothing changed since the previous successful execution.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Why the unit of work is out of date, most fundamental first
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Whether an execution may consume real input changes
    #[must_use]
    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    /// Usable previous input fingerprints
    #[must_use]
    pub fn previous_inputs(&self) -> &BTreeMap<String, PreviousFileCollectionFingerprint> {
        &self.previous_inputs
    }
}

/// Bounded list of out-of-date reasons
struct Reasons {
    messages: Vec<String>,
    limit: usize,
}

impl Reasons {
    fn push(&mut self, message: impl Into<String>) {
        if self.has_room() {
            self.messages.push(message.into());
        }
    }

    fn has_room(&self) -> bool {
        self.messages.len() < self.limit
    }
}

/// Compares executions and explains differences.
#[derive(Debug, Clone)]
pub struct UpToDateChecker<C = NormalizedPathCompareStrategy> {
    compare: C,
    max_messages: usize,
}

impl UpToDateChecker {
    /// Checker using normalized path comparison.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_compare_strategy(NormalizedPathCompareStrategy, config)
    }
}

impl<C: FingerprintCompareStrategy> UpToDateChecker<C> {
    /// Checker using `compare` for file changes.
    #[must_use]
    pub fn with_compare_strategy(compare: C, config: &EngineConfig) -> Self {
        Self {
            compare,
            max_messages: config.max_out_of_date_messages.max(1),
        }
    }

    /// Check `current` against the `previous` execution.
    #[must_use]
    pub fn check(
        &self,
        previous: Option<&ExecutionRecord>,
        current: &BeforeExecutionState,
    ) -> UpToDateVerdict {
        let mut reasons = Reasons {
            messages: Vec::new(),
            limit: self.max_messages,
        };

        let Some(previous) = previous else {
            reasons.push("No history is available.");
            return UpToDateVerdict {
                reasons: reasons.messages,
                incremental: false,
                previous_inputs: BTreeMap::new(),
            };
        };

        let mut incremental = true;
        if !previous.successful {
            reasons.push("Task has failed previously.");
            incremental = false;
        }
        if previous.implementation_hash != current.implementation_hash {
            reasons.push("Implementation has changed.");
            incremental = false;
        }

        for name in current.input_files.keys() {
            if !previous.input_files.contains_key(name) {
                reasons.push(format!("Input property '{name}' has been added."));
                incremental = false;
            }
        }
        for name in previous.input_files.keys() {
            if !current.input_files.contains_key(name) {
                reasons.push(format!("Input property '{name}' has been removed."));
                incremental = false;
            }
        }

        let mut previous_inputs = BTreeMap::new();
        for (name, record) in &previous.input_files {
            let Some(now) = current.input_files.get(name) else {
                continue;
            };
            let before = record.to_previous();
            if usable(&before, now, name) {
                let _ = previous_inputs.insert(name.clone(), before);
            } else {
                reasons.push(format!(
                    "Fingerprinting strategy for input property '{name}' has changed."
                ));
                incremental = false;
            }
        }

        for (name, now) in &current.input_files {
            if let Some(before) = previous_inputs.get(name) {
                self.collect_file_changes("Input", name, before, now, true, &mut reasons);
            }
        }

        let previous_outputs = previous.previous_output_files();
        for (name, now) in &current.output_files {
            match previous_outputs.get(name) {
                None => reasons.push(format!("Output property '{name}' has been added.")),
                Some(before) if !usable(before, now, name) => reasons.push(format!(
                    "Fingerprinting strategy for output property '{name}' has changed."
                )),
                Some(before) => {
                    self.collect_file_changes("Output", name, before, now, false, &mut reasons);
                }
            }
        }
        for name in previous_outputs.keys() {
            if !current.output_files.contains_key(name) {
                reasons.push(format!("Output property '{name}' has been removed."));
            }
        }

        match reasons.messages.first() {
            Some(first) => debug!("Out of date: {}", first),
            None => debug!("Up to date"),
        }

        UpToDateVerdict {
            reasons: reasons.messages,
            incremental,
            previous_inputs,
        }
    }

    fn collect_file_changes(
        &self,
        kind: &str,
        name: &str,
        before: &PreviousFileCollectionFingerprint,
        now: &CurrentFileCollectionFingerprint,
        include_added: bool,
        reasons: &mut Reasons,
    ) {
        if !reasons.has_room() {
            return;
        }
        let mut found = false;
        let _ = self
            .compare
            .visit_changes_since(before, now, name, include_added, &mut |change| {
                found = true;
                reasons.push(format!("{kind} property '{name}' {change}"));
                reasons.has_room()
            });

        // Same entries in a different order only show in the combined hash
        if !found
            && now.hashing_strategy() == FingerprintHashingStrategy::Ordered
            && before.len() == now.len()
            && before.hash() != now.hash()
        {
            reasons.push(format!("{kind} property '{name}' has changed order."));
        }
    }
}

fn usable(
    before: &PreviousFileCollectionFingerprint,
    now: &CurrentFileCollectionFingerprint,
    name: &str,
) -> bool {
    if !before.is_self_consistent() {
        warn!("Previous fingerprint of '{}' is damaged, ignoring it", name);
        return false;
    }
    if !before.is_compatible_with(now) {
        warn!(
            "Previous fingerprint of '{}' was created with a different strategy",
            name
        );
        return false;
    }
    true
}

/// Builds the input changes an execution sees, given its verdict.
#[derive(Debug, Clone, Copy)]
pub struct InputChangesContext<'a> {
    verdict: &'a UpToDateVerdict,
    properties: &'a IncrementalInputProperties,
    current: &'a BTreeMap<String, CurrentFileCollectionFingerprint>,
}

impl<'a> InputChangesContext<'a> {
    /// Context for one execution.
    #[must_use]
    pub fn new(
        verdict: &'a UpToDateVerdict,
        properties: &'a IncrementalInputProperties,
        current: &'a BTreeMap<String, CurrentFileCollectionFingerprint>,
    ) -> Self {
        Self {
            verdict,
            properties,
            current,
        }
    }

    /// Real changes of the incremental properties when the verdict allows
    /// it, otherwise every file of every property as added.
    #[must_use]
    pub fn input_changes(&self) -> InputFileChanges<'a> {
        if self.verdict.is_incremental() {
            self.properties
                .incremental_changes(&self.verdict.previous_inputs, self.current)
        } else {
            InputFileChanges::rebuild_all(self.properties, self.current)
        }
    }
}
