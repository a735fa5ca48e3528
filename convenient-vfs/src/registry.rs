//! Which units of work read which paths, and which of them saw changes.
//!
//! The registry only ever answers "maybe changed" too often, never too
//! rarely. A unit of work it knows nothing about counts as changed, and a
//! change event marks every unit of work registered at the path, above it or
//! below it.

use crate::watch::FileChangeType;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct RegistryState {
    path_to_identities: BTreeMap<PathBuf, HashSet<String>>,
    identity_to_paths: HashMap<String, HashSet<PathBuf>>,
    changed_identities: HashSet<String>,
    registered: HashSet<String>,
    previously_registered: HashSet<String>,
}

impl RegistryState {
    fn unregister_paths(&mut self, identity: &str) {
        let Some(paths) = self.identity_to_paths.remove(identity) else {
            return;
        };
        for path in paths {
            if let Some(identities) = self.path_to_identities.get_mut(&path) {
                let _ = identities.remove(identity);
                if identities.is_empty() {
                    let _ = self.path_to_identities.remove(&path);
                }
            }
        }
    }

    /// Identities registered at `path`, at one of its ancestors or below it
    fn affected_by(&self, path: &Path) -> HashSet<String> {
        let mut affected = HashSet::new();
        for ancestor in path.ancestors() {
            if let Some(identities) = self.path_to_identities.get(ancestor) {
                affected.extend(identities.iter().cloned());
            }
        }
        // Descendants sort right after `path`, component by component
        for (_, identities) in self
            .path_to_identities
            .range(path.to_path_buf()..)
            .take_while(|(registered, _)| registered.starts_with(path))
        {
            affected.extend(identities.iter().cloned());
        }
        affected
    }
}

/// Tracks the input paths of units of work across builds.
///
/// Only one build of history is kept: a unit of work that did not register
/// its inputs in the previous build is reported as changed.
#[derive(Debug, Default)]
pub struct UnitOfWorkVfsChangesRegistry {
    state: RwLock<RegistryState>,
}

impl UnitOfWorkVfsChangesRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the file inputs of `identity` for this build, replacing what
    /// was recorded for it before.
    pub fn register_file_inputs<I>(&self, identity: &str, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut state = self.write();
        state.unregister_paths(identity);

        let paths: HashSet<PathBuf> = paths.into_iter().collect();
        for path in &paths {
            let _ = state
                .path_to_identities
                .entry(path.clone())
                .or_default()
                .insert(identity.to_string());
        }
        debug!("Registered {} input paths for {}", paths.len(), identity);
        let _ = state.identity_to_paths.insert(identity.to_string(), paths);
        let _ = state.registered.insert(identity.to_string());
    }

    /// Record a change reported by the file watcher.
    pub fn register_change(&self, change_type: FileChangeType, path: &Path) {
        let mut state = self.write();
        let affected = state.affected_by(path);
        if !affected.is_empty() {
            debug!(
                "{} {} affects {} units of work",
                change_type,
                path.display(),
                affected.len()
            );
        }
        state.changed_identities.extend(affected);
    }

    /// Whether any input of `identity` may have changed since its inputs
    /// were registered in the previous build.
    #[must_use]
    pub fn has_any_file_input_changed(&self, identity: &str) -> bool {
        let state = self.read();
        !state.previously_registered.contains(identity)
            || state.changed_identities.contains(identity)
    }

    /// End of build: this build's registrations become the previous ones.
    ///
    /// Identities that saw a change after registering in this build are
    /// left out of the previous set, so they count as changed next build.
    pub fn invalidate_changes(&self) {
        let mut state = self.write();
        let registered = std::mem::take(&mut state.registered);
        let changed = std::mem::take(&mut state.changed_identities);
        state.previously_registered = registered.difference(&changed).cloned().collect();
        info!(
            "Retained input registrations of {} units of work",
            state.previously_registered.len()
        );
    }

    /// Forget everything. Every identity counts as changed afterwards.
    pub fn invalidate_all(&self) {
        *self.write() = RegistryState::default();
        info!("Invalidated all unit of work input registrations");
    }
}
